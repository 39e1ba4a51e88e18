/// Build version; packagers may stamp `MEMSNAP_VERSION` at compile time.
pub const VERSION: &str = match option_env!("MEMSNAP_VERSION") {
    Some(version) => version,
    None => env!("CARGO_PKG_VERSION"),
};
