//! End-to-end simulation scenarios.

use railsim_core::prelude::*;
use railsim_core::uc;

fn node(user_id: i64, x: f64, y: f64, terminal: bool) -> NodeRecord {
    NodeRecord {
        user_id,
        x,
        y,
        desc: String::new(),
        is_terminal: terminal,
        terminal_dwell_time_s: 0.0,
        x_scale: 1.0,
        y_scale: 1.0,
    }
}

fn link(user_id: i64, from: i64, to: i64, length: f64, speed: f64) -> LinkRecord {
    LinkRecord {
        user_id,
        from_node: from,
        to_node: to,
        length_m: length,
        free_flow_speed_mps: speed,
        signal_id: 0,
        grade: 0.0,
        curvature: 0.0,
        directions: 1,
        speed_variation: 0.0,
        has_catenary: false,
        signals_at_nodes: vec![],
        region: "main".into(),
        length_scale: 1.0,
        speed_scale: 1.0,
        intermediate_points: vec![],
    }
}

fn locomotive(power_type: PowerType, max_power_kw: f64) -> LocomotiveSpec {
    LocomotiveSpec {
        count: 1,
        config: LocomotiveConfig {
            power_type,
            max_power_kw,
            gross_mass_tons: 180.0,
            drag_coef: 0.0055,
            frontal_area_sqm: 10.5,
            transmission_eff: 0.965,
            length_m: 23.0,
            axles: 6,
            notch_count: 8,
            max_notch: 0,
            aux_power_kw: 0.0,
            // rated speed matched to the service speed of the scenarios
            max_speed_mps: 20.0,
            battery_max_kwh: None,
            battery_initial_soc: None,
            battery_c_rate: 2.0,
            tank_max_liters: None,
            tank_initial_fill: None,
            hybrid_method: None,
        },
    }
}

fn train(user_id: &str, path: Vec<i64>, start: f64, loco: LocomotiveSpec) -> TrainRecord {
    TrainRecord {
        user_id: user_id.into(),
        path,
        start_time_s: start,
        friction_coef: 0.2,
        locomotives: vec![loco],
        cars: vec![],
        optimize: false,
        // brisk service braking, kept below the adhesion limit so the
        // closure law can actually track it
        desired_deceleration: 1.8,
        reaction_time_s: 0.5,
        max_jerk: 2.0,
    }
}

fn config(end_time_s: f64) -> SimConfig {
    SimConfig {
        time_step_s: 1.0,
        end_time_s,
        run_endlessly: false,
        plot_frequency_s: None,
    }
}

/// S1: a single diesel train runs a 1 km link terminal to terminal.
#[test]
fn single_train_free_run() {
    let nodes = vec![node(0, 0.0, 0.0, true), node(1, 1000.0, 0.0, true)];
    let links = vec![link(1, 0, 1, 1000.0, 20.0)];
    let network = Network::new(nodes, links).unwrap();
    let records = vec![train("t1", vec![0, 1], 0.0, locomotive(PowerType::Diesel, 3000.0))];
    let mut sim = Simulator::new(network, &records, config(600.0)).unwrap();

    let mut ticks = 0u32;
    while !sim.all_trains_done() && ticks < 600 {
        sim.step().unwrap();
        ticks += 1;
        let t = &sim.trains[0];
        // tick invariants
        assert!(t.travelled >= si::Length::ZERO);
        assert!(t.travelled <= t.total_path_length);
        assert!(t.speed >= si::Velocity::ZERO);
    }

    let t = &sim.trains[0];
    assert!(t.reached_destination);
    assert!(!t.out_of_energy);
    let trip = t.stats.trip_time.get::<si::second>();
    assert!(
        (55.0..=75.0).contains(&trip),
        "trip time {trip} s outside [55, 75]"
    );
    assert!(t.stats.cum_net_energy > si::Energy::ZERO);
    assert!(t.stats.total_consumed > si::Energy::ZERO);
}

/// S2: a diesel-hybrid regenerates into its battery while braking for the
/// terminal on a down-grade.
#[test]
fn hybrid_regenerates_while_braking() {
    let nodes = vec![node(0, 0.0, 0.0, true), node(1, 2000.0, 0.0, true)];
    let mut l = link(1, 0, 1, 2000.0, 30.0);
    l.grade = -0.01;
    let network = Network::new(nodes, vec![l]).unwrap();
    let mut loco = locomotive(PowerType::DieselHybrid, 3000.0);
    loco.config.battery_initial_soc = Some(0.6);
    let records = vec![train("t1", vec![0, 1], 0.0, loco)];
    let mut sim = Simulator::new(network, &records, config(600.0)).unwrap();

    let battery_charge = |sim: &Simulator| {
        sim.trains[0]
            .first_locomotive()
            .battery
            .as_ref()
            .unwrap()
            .current_charge()
    };

    let mut charge_increased = false;
    let mut previous = battery_charge(&sim);
    let mut ticks = 0u32;
    while !sim.all_trains_done() && ticks < 600 {
        sim.step().unwrap();
        ticks += 1;
        let now = battery_charge(&sim);
        if now > previous {
            charge_increased = true;
        }
        previous = now;
    }

    assert!(sim.trains[0].reached_destination);
    assert!(charge_increased, "battery never charged during the descent");
    assert!(sim.trains[0].stats.total_regenerated > si::Energy::ZERO);
}

/// S3: a red signal at an intermediate node stops the train until its
/// group controller admits it.
#[test]
fn red_signal_stops_then_releases() {
    // t1 runs A(0) -> B(1) -> C(2); a slow crossing train t2 runs
    // D(3) -> B -> E(4) and holds the junction queue first
    let nodes = vec![
        node(0, 0.0, 0.0, false),
        node(1, 500.0, 0.0, false),
        node(2, 1000.0, 0.0, true),
        node(3, 500.0, -150.0, false),
        node(4, 500.0, 500.0, true),
    ];
    let mut ab = link(1, 0, 1, 500.0, 20.0);
    ab.signal_id = 7;
    ab.signals_at_nodes = vec![1];
    let bc = link(2, 1, 2, 500.0, 20.0);
    let mut db = link(3, 3, 1, 150.0, 20.0);
    db.signal_id = 7;
    db.signals_at_nodes = vec![1];
    let be = link(4, 1, 4, 500.0, 20.0);
    let network = Network::new(nodes, vec![ab, bc, db, be]).unwrap();

    let records = vec![
        train("t1", vec![0, 1, 2], 0.0, locomotive(PowerType::Diesel, 3000.0)),
        // underpowered, so it crawls across the junction and holds it
        train("t2", vec![3, 1, 4], 0.0, locomotive(PowerType::Diesel, 150.0)),
    ];
    // a finer step keeps the snap-to-stop within the 2 m tolerance
    let mut sim = Simulator::new(
        network,
        &records,
        SimConfig {
            time_step_s: 0.5,
            ..config(600.0)
        },
    )
    .unwrap();
    assert!(
        !sim.signal_groups().is_empty(),
        "shared signalled node must produce a controller"
    );

    let signal_into_b = sim
        .network
        .signals
        .iter()
        .find(|s| {
            sim.network.node(s.node).user_id == 1 && sim.network.node(s.prev_node).user_id == 0
        })
        .map(|s| s.idx)
        .expect("signal governing A -> B");

    let mut stopped_near_b = false;
    let mut stop_gap_m = f64::MAX;
    for _ in 0..800 {
        sim.step().unwrap();
        let t1 = &sim.trains[0];
        if !sim.network.signal(signal_into_b).is_green {
            // a red aspect holds the train out of BC
            assert!(
                t1.travelled.get::<si::meter>() <= 500.5,
                "train entered BC against a red signal"
            );
        }
        if t1.loaded
            && t1.speed == si::Velocity::ZERO
            && !t1.reached_destination
            && t1.travelled.get::<si::meter>() > 400.0
        {
            let gap = 500.0 - t1.travelled.get::<si::meter>();
            if gap < stop_gap_m {
                stop_gap_m = gap;
            }
            if sim.time <= 60.0 * uc::S {
                stopped_near_b = true;
            }
        }
        if sim.trains[0].reached_destination && sim.trains[1].reached_destination {
            break;
        }
    }

    assert!(stopped_near_b, "train never stopped for the red signal");
    assert!(
        (0.0..=2.0).contains(&stop_gap_m),
        "stopped {stop_gap_m} m short of the signal"
    );
    assert!(sim.trains[0].reached_destination, "train never released");
}

/// S4: two trains crossing a shared junction from perpendicular paths;
/// the earlier arrival crosses first and the later one is held clear.
#[test]
fn signal_group_orders_conflicting_trains() {
    let nodes = vec![
        node(0, 0.0, 0.0, false),    // W
        node(1, 500.0, 0.0, false),  // S junction
        node(2, 1000.0, 0.0, true),  // E
        node(3, 500.0, -500.0, false), // N approach
        node(4, 500.0, 500.0, true), // M
    ];
    let mut ws = link(1, 0, 1, 500.0, 20.0);
    ws.signal_id = 9;
    ws.signals_at_nodes = vec![1];
    let se = link(2, 1, 2, 500.0, 20.0);
    let mut ns = link(3, 3, 1, 500.0, 20.0);
    ns.signal_id = 9;
    ns.signals_at_nodes = vec![1];
    let sm = link(4, 1, 4, 500.0, 20.0);
    let network = Network::new(nodes, vec![ws, se, ns, sm]).unwrap();

    let records = vec![
        train("west", vec![0, 1, 2], 0.0, locomotive(PowerType::Diesel, 3000.0)),
        train("north", vec![3, 1, 4], 3.0, locomotive(PowerType::Diesel, 3000.0)),
    ];
    let mut sim = Simulator::new(network, &records, config(600.0)).unwrap();

    let junction_cum = 500.0;
    let mut west_cleared_at: Option<f64> = None;
    let mut north_crossed_at: Option<f64> = None;
    let mut west_clearance_at_north_crossing = f64::NAN;
    for _ in 0..400 {
        sim.step().unwrap();
        // symmetric occupancy invariant
        for link in &sim.network.links {
            for &t in &link.current_trains {
                assert!(
                    sim.trains[t.idx()].current_links.contains(&link.idx),
                    "occupancy out of sync on link {}",
                    link.user_id
                );
            }
        }
        let west = &sim.trains[0];
        let north = &sim.trains[1];
        let west_tail = west.travelled - west.total_length;
        if west_cleared_at.is_none() && west_tail.get::<si::meter>() > junction_cum {
            west_cleared_at = Some(sim.time.get::<si::second>());
        }
        if north_crossed_at.is_none() && north.travelled.get::<si::meter>() > junction_cum {
            north_crossed_at = Some(sim.time.get::<si::second>());
            west_clearance_at_north_crossing =
                west_tail.get::<si::meter>() - junction_cum;
        }
        if west.reached_destination && north.reached_destination {
            break;
        }
    }

    let west_cleared_at = west_cleared_at.expect("west train never cleared the junction");
    let north_crossed_at = north_crossed_at.expect("north train never crossed");
    assert!(
        west_cleared_at < north_crossed_at,
        "the earlier arrival must cross first"
    );
    assert!(
        west_clearance_at_north_crossing > sim.trains[0].total_length.get::<si::meter>(),
        "north train entered before the west train cleared a full train length"
    );
    assert!(sim.trains[0].reached_destination);
    assert!(sim.trains[1].reached_destination);
}

/// S5: an electric locomotive with a nearly-empty battery and no catenary
/// shuts down; the train coasts and the simulator keeps going.
#[test]
fn electric_without_charge_runs_out_of_energy() {
    let nodes = vec![node(0, 0.0, 0.0, true), node(1, 5000.0, 0.0, true)];
    let links = vec![link(1, 0, 1, 5000.0, 20.0)];
    let network = Network::new(nodes, links).unwrap();
    let mut loco = locomotive(PowerType::Electric, 3000.0);
    loco.config.battery_initial_soc = Some(0.02);
    let records = vec![train("t1", vec![0, 1], 0.0, loco)];
    let mut sim = Simulator::new(network, &records, config(600.0)).unwrap();

    for _ in 0..10 {
        sim.step().unwrap();
    }
    assert!(
        sim.trains[0].out_of_energy,
        "locomotive should shut down within a handful of ticks"
    );
    assert!(!sim.trains[0].reached_destination);

    // keep stepping: the train coasts to a stop, nothing aborts
    for _ in 0..300 {
        sim.step().unwrap();
    }
    assert!(
        sim.trains[0].speed < 0.001 * uc::MPS,
        "train should have coasted to a stop"
    );
    assert!(sim.trains[0].travelled < sim.trains[0].total_path_length);

    // battery invariant held throughout
    let battery = sim.trains[0].first_locomotive().battery.as_ref().unwrap();
    assert!(battery.current_charge() >= si::Energy::ZERO);
    assert!(battery.current_charge() <= battery.max_capacity());
}

/// S6: a sparse two-node user path expands to the min-length node
/// sequence with matching cumulative lengths.
#[test]
fn sparse_path_expands_before_running() {
    // a ring of five nodes with an internal chord from 1 to 3
    let nodes = vec![
        node(0, 0.0, 0.0, false),
        node(1, 100.0, 0.0, false),
        node(2, 200.0, 0.0, false),
        node(3, 300.0, 0.0, false),
        node(4, 400.0, 0.0, true),
    ];
    let mut links = vec![
        link(1, 0, 1, 100.0, 20.0),
        link(2, 1, 2, 100.0, 20.0),
        link(3, 2, 3, 100.0, 20.0),
        link(4, 3, 4, 100.0, 20.0),
        link(5, 4, 0, 500.0, 20.0),
        link(6, 1, 3, 150.0, 20.0),
    ];
    for l in &mut links {
        l.directions = 2;
    }
    let network = Network::new(nodes, links).unwrap();
    let records = vec![train("t1", vec![0, 4], 0.0, locomotive(PowerType::Diesel, 3000.0))];
    let sim = Simulator::new(network, &records, config(600.0)).unwrap();

    let ids: Vec<i64> = sim.trains[0]
        .path
        .iter()
        .map(|&n| sim.network.node(n).user_id)
        .collect();
    assert_eq!(ids, vec![0, 1, 3, 4]);
    let cum: Vec<f64> = sim.trains[0]
        .cum_lengths
        .iter()
        .map(|l| l.get::<si::meter>())
        .collect();
    assert_eq!(cum, vec![0.0, 100.0, 250.0, 350.0]);
}

/// A second train sharing the origin cannot load until the first has
/// cleared one train length.
#[test]
fn departure_gating_holds_the_second_train() {
    let nodes = vec![node(0, 0.0, 0.0, true), node(1, 2000.0, 0.0, true)];
    let links = vec![link(1, 0, 1, 2000.0, 20.0)];
    let network = Network::new(nodes, links).unwrap();
    let records = vec![
        train("first", vec![0, 1], 0.0, locomotive(PowerType::Diesel, 3000.0)),
        train("second", vec![0, 1], 0.0, locomotive(PowerType::Diesel, 3000.0)),
    ];
    let mut sim = Simulator::new(network, &records, config(600.0)).unwrap();

    let mut second_loaded_at: Option<f64> = None;
    for _ in 0..120 {
        sim.step().unwrap();
        if sim.trains[1].loaded {
            second_loaded_at.get_or_insert(sim.time.get::<si::second>());
            break;
        }
        // while the first train is inside its own length, the second waits
        if sim.trains[0].travelled <= sim.trains[0].total_length {
            assert!(!sim.trains[1].loaded);
        }
    }
    assert!(second_loaded_at.is_some(), "second train never loaded");
    assert!(
        sim.trains[0].travelled > sim.trains[0].total_length,
        "second train loaded before the first cleared its length"
    );
}

/// A cancelled run stops between ticks and still reports records.
#[test]
fn cancellation_stops_the_loop() {
    let nodes = vec![node(0, 0.0, 0.0, true), node(1, 10_000.0, 0.0, true)];
    let links = vec![link(1, 0, 1, 10_000.0, 20.0)];
    let network = Network::new(nodes, links).unwrap();
    let records = vec![train("t1", vec![0, 1], 0.0, locomotive(PowerType::Diesel, 3000.0))];
    let mut sim = Simulator::new(network, &records, config(10_000.0)).unwrap();
    let (events, rx) = event_channel();
    sim.set_event_sender(events);

    sim.control().cancel();
    let records = sim.run().unwrap();
    assert_eq!(records.len(), 1);
    assert!(!records[0].reached_destination);
    // the finished event is still emitted
    let finished = rx.try_iter().any(|e| matches!(e, SimEvent::Finished { .. }));
    assert!(finished);
}
