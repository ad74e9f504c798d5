use regex::Regex;
use scraper::Selector;
use std::sync::LazyLock;

macro_rules! selector {
    ($name:ident, $css:expr) => {
        pub(crate) static $name: LazyLock<Selector> = LazyLock::new(|| Selector::parse($css).unwrap());
    };
}

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

selector!(META_SELECTOR, "meta");
selector!(HTML_SELECTOR, "html");
selector!(TITLE_SELECTOR, "title");
selector!(LINK_SELECTOR, "link[href]");
selector!(SCRIPT_SELECTOR, "script[src]");
selector!(IMG_SELECTOR, "img[src]");
selector!(ANCHOR_SELECTOR, "a[href]");
// RFC 3986 scheme; anything carrying one is not a local file.
regex!(URL_SCHEME_REGEX, r"^[A-Za-z][A-Za-z0-9+.\-]*:");
// `key[lang]` on the left-hand side of a `.dirinfo` line.
regex!(DIRINFO_KEY_REGEX, r"^(\w+)\[(\w+)\]");

/// Name of the per-directory descriptor file.
pub const DIRINFO_FILENAME: &str = ".dirinfo";
/// Cover picked up automatically when a descriptor declares none.
pub const DEFAULT_COVER: &str = "cover.jpg";
