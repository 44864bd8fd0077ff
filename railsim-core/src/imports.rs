//! Internal prelude for the crate's own modules.

pub(crate) use crate::error::SimError;
pub(crate) use crate::si;
pub(crate) use crate::traits::{Init, SerdeAPI};
pub(crate) use crate::uc;
pub(crate) use crate::utils;
pub(crate) use crate::utils::{almost_eq, Coord, IdxExt};

pub(crate) use anyhow::ensure;
pub(crate) use serde::{Deserialize, Serialize};
pub(crate) use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
pub(crate) use std::fmt;
pub(crate) use std::path::Path;
pub(crate) use uom::typenum;
pub(crate) use uom::ConstZero;
