/// Returns a string with the current file and line, optionally appending the
/// value of an expression. Used to tag error contexts with their origin.
#[macro_export]
macro_rules! format_dbg {
    () => {
        format!("{}:{}", file!(), line!())
    };
    ($dbg_expr:expr) => {
        format!(
            "{}:{}\n`{}` = {:?}",
            file!(),
            line!(),
            stringify!($dbg_expr),
            $dbg_expr
        )
    };
}
