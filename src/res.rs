/// Embed a file from the crate's `res/` directory as a `&'static str`.
///
/// ```ignore
/// let schema = include_res!(str, "/schema.sql");
/// ```
#[macro_export]
macro_rules! include_res {
    (str, $p:expr) => {
        include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/res", $p))
    };
}
