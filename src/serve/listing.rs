// src/serve/listing.rs
// Directory listings: the two entry sources and the HTML index page

use chrono::{DateTime, Local};
use std::ffi::OsStr;
use std::fmt::{self, Write};
use std::fs;
use std::io;
use std::path::Path;
use std::time::SystemTime;

use super::root::stat_or_lstat;

pub const DEFAULT_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const SIZE_UNITS: [&str; 9] = ["B", "kB", "MB", "GB", "TB", "PB", "EB", "ZB", "YB"];

/// Index-addressable view over one directory read, sorted by name bytes.
pub trait DirEntries {
    fn count(&self) -> usize;
    fn is_dir(&self, index: usize) -> bool;
    /// Display form, lossy for names that are not UTF-8
    fn name(&self, index: usize) -> &str;
    /// Name as stored on disk; links and ordering use these bytes
    fn raw_name(&self, index: usize) -> &[u8] {
        self.name(index).as_bytes()
    }
    /// Byte size, `-1` for directories and `0` when it cannot be determined
    fn size(&self, index: usize) -> i64;
    fn modified(&self, index: usize) -> Option<SystemTime>;
}

#[cfg(unix)]
fn name_bytes(name: &OsStr) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    name.as_bytes().to_vec()
}

#[cfg(not(unix))]
fn name_bytes(name: &OsStr) -> Vec<u8> {
    name.to_string_lossy().into_owned().into_bytes()
}

struct LazyEntry {
    name: String,
    raw: Vec<u8>,
    is_dir: bool,
    entry: fs::DirEntry,
}

/// Names and types straight from `read_dir`; size and modification time
/// are only looked up when the renderer asks for them.
pub struct LazyEntries {
    entries: Vec<LazyEntry>,
}

impl LazyEntries {
    pub fn read(dir: &Path) -> io::Result<Self> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            let file_name = entry.file_name();
            entries.push(LazyEntry {
                name: file_name.to_string_lossy().into_owned(),
                raw: name_bytes(&file_name),
                is_dir,
                entry,
            });
        }
        entries.sort_by(|a, b| a.raw.cmp(&b.raw));
        Ok(LazyEntries { entries })
    }
}

impl DirEntries for LazyEntries {
    fn count(&self) -> usize {
        self.entries.len()
    }

    fn is_dir(&self, index: usize) -> bool {
        self.entries[index].is_dir
    }

    fn name(&self, index: usize) -> &str {
        &self.entries[index].name
    }

    fn raw_name(&self, index: usize) -> &[u8] {
        &self.entries[index].raw
    }

    fn size(&self, index: usize) -> i64 {
        let entry = &self.entries[index];
        if entry.is_dir {
            return -1;
        }
        entry
            .entry
            .metadata()
            .map(|m| m.len() as i64)
            .unwrap_or(0)
    }

    fn modified(&self, index: usize) -> Option<SystemTime> {
        self.entries[index]
            .entry
            .metadata()
            .and_then(|m| m.modified())
            .ok()
    }
}

struct StatEntry {
    name: String,
    raw: Vec<u8>,
    metadata: fs::Metadata,
}

/// Every entry stat'ed through symlinks up front.
pub struct StatEntries {
    entries: Vec<StatEntry>,
}

impl StatEntries {
    pub fn read(dir: &Path) -> io::Result<Self> {
        let mut entries = Vec::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            match stat_or_lstat(&entry.path()) {
                Ok(metadata) => {
                    let file_name = entry.file_name();
                    entries.push(StatEntry {
                        name: file_name.to_string_lossy().into_owned(),
                        raw: name_bytes(&file_name),
                        metadata,
                    })
                }
                Err(err) => log::debug!("skipping {}: {}", entry.path().display(), err),
            }
        }
        entries.sort_by(|a, b| a.raw.cmp(&b.raw));
        Ok(StatEntries { entries })
    }
}

impl DirEntries for StatEntries {
    fn count(&self) -> usize {
        self.entries.len()
    }

    fn is_dir(&self, index: usize) -> bool {
        self.entries[index].metadata.is_dir()
    }

    fn name(&self, index: usize) -> &str {
        &self.entries[index].name
    }

    fn raw_name(&self, index: usize) -> &[u8] {
        &self.entries[index].raw
    }

    fn size(&self, index: usize) -> i64 {
        let metadata = &self.entries[index].metadata;
        if metadata.is_dir() {
            -1
        } else {
            metadata.len() as i64
        }
    }

    fn modified(&self, index: usize) -> Option<SystemTime> {
        self.entries[index].metadata.modified().ok()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ListingOptions<'a> {
    /// strftime-style format for the time column
    pub time_format: &'a str,
    pub exact_size: bool,
}

impl Default for ListingOptions<'_> {
    fn default() -> Self {
        ListingOptions {
            time_format: DEFAULT_TIME_FORMAT,
            exact_size: false,
        }
    }
}

pub fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&#34;"),
            '\'' => escaped.push_str("&#39;"),
            other => escaped.push(other),
        }
    }
    escaped
}

/// Format with `digits` significant digits, dropping trailing zeros.
fn significant(value: f64, digits: i32) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    let exponent = value.abs().log10().floor() as i32;
    let decimals = (digits - 1 - exponent).max(0) as usize;
    let formatted = format!("{:.*}", decimals, value);
    if formatted.contains('.') {
        formatted
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    } else {
        formatted
    }
}

/// Decimal (base 1000) size with four significant digits, e.g. `12.35kB`.
pub fn human_size(bytes: i64) -> String {
    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1000.0 && unit < SIZE_UNITS.len() - 1 {
        size /= 1000.0;
        unit += 1;
    }
    format!("{}{}", significant(size, 4), SIZE_UNITS[unit])
}

fn format_time(modified: Option<SystemTime>, format: &str, out: &mut String) -> fmt::Result {
    match modified {
        Some(time) => write!(out, "{}", DateTime::<Local>::from(time).format(format)),
        None => out.write_char('-'),
    }
}

/// Render the index page for `request_uri` (path and query as received).
///
/// Fails only when the time format cannot be applied.
pub fn render_listing(
    entries: &dyn DirEntries,
    request_uri: &str,
    options: ListingOptions<'_>,
) -> Result<String, fmt::Error> {
    let title = html_escape(&format!("Index of {}", request_uri));
    let mut html = String::with_capacity(2048 + entries.count() * 256);

    html.push_str("<html>\n<head>\n<title>\n");
    writeln!(html, "{}", title)?;
    html.push_str("</title>\n</head>\n");
    html.push_str(concat!(
        "<style>\n",
        "body {display: flex;min-height: 100vh;flex-direction: column; margin:0px; padding:0px 8px;}\n",
        "hr {display:block;border: 0;width:100%;height: 1px;background-color:#555555;clear:both;}\n",
        ".link {text-decoration: none;color: #000; padding:0 5px}\n",
        ".item {display: flex; flex-direction: row;justify-content: flex-start;align-items: flex-start;}\n",
        ".item-file {display: flex; flex-grow: 6; min-width:600px;max-width:600px; overflow:hidden;text-overflow:ellipsis;white-space:nowrap}\n",
        ".item-time {display: flex; flex-grow: 3; min-width:300px;max-width:300px;}\n",
        ".item-size {display: flex; flex-grow: 2; min-width:200px;max-width:200px;}\n",
        ".header {display: flex;flex-direction: column; justify-content: flex-start;align-items: flex-start;flex: 0 0 auto;}\n",
        ".content {display: flex;flex-direction: column; justify-content: flex-start;align-items: flex-start;flex: 1 0 auto;}\n",
        ".footer {display: flex; justify-content: center;align-items: center;flex-direction: row; flex: 0 0 auto; padding-bottom:10px;}\n",
        "</style>\n",
    ));

    html.push_str("<body>\n<div class=\"header\">\n<h1>\n");
    writeln!(html, "{}", title)?;
    html.push_str("</h1>\n</div>\n");

    html.push_str("<div class=\"content\">\n<hr>\n");
    html.push_str("<item class=\"item\">\n");
    html.push_str("<span class=\"item-file\"><a href=\"../\">../</a>\n</span>\n");
    html.push_str("</item>\n");

    for i in 0..entries.count() {
        let is_dir = entries.is_dir(i);
        let mut name = entries.name(i).to_string();
        // Escape the name so `?` and `#` stay part of the path
        let mut href = urlencoding::encode_binary(entries.raw_name(i)).into_owned();
        if is_dir {
            name.push('/');
            href.push('/');
        }

        html.push_str("<item class=\"item\">\n");
        write!(
            html,
            "<span class=\"item-file\"><a href=\"{}\">{}</a></span><span class=\"item-time\">",
            href,
            html_escape(&name)
        )?;
        format_time(entries.modified(i), options.time_format, &mut html)?;
        html.push_str("</span><span class=\"item-size\">");
        if is_dir {
            html.push('-');
        } else if options.exact_size {
            write!(html, "{}", entries.size(i))?;
        } else {
            html.push_str(&human_size(entries.size(i)));
        }
        html.push_str("</span>\n</item>\n");
    }

    html.push_str("<hr>\n</div>\n");
    html.push_str("<div class=\"footer\">\n");
    writeln!(
        html,
        "Powered by<span class=\"link\">{}/{}</span>",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION")
    )?;
    html.push_str("</div>\n</body>\n</html>\n");

    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, UNIX_EPOCH};
    use tempfile::TempDir;

    /// Fixed entries so the rendered page is deterministic.
    struct Fixed(Vec<(&'static str, bool, i64)>);

    impl DirEntries for Fixed {
        fn count(&self) -> usize {
            self.0.len()
        }
        fn is_dir(&self, index: usize) -> bool {
            self.0[index].1
        }
        fn name(&self, index: usize) -> &str {
            self.0[index].0
        }
        fn size(&self, index: usize) -> i64 {
            self.0[index].2
        }
        fn modified(&self, _index: usize) -> Option<SystemTime> {
            Some(UNIX_EPOCH + Duration::from_secs(1_700_000_000))
        }
    }

    #[test]
    fn test_human_size() {
        assert_eq!(human_size(0), "0B");
        assert_eq!(human_size(10), "10B");
        assert_eq!(human_size(999), "999B");
        assert_eq!(human_size(1000), "1kB");
        assert_eq!(human_size(12_346), "12.35kB");
        assert_eq!(human_size(1_500_000), "1.5MB");
        assert_eq!(human_size(999_999), "1000kB");
        assert_eq!(human_size(3_000_000_000), "3GB");
    }

    #[test]
    fn test_html_escape() {
        assert_eq!(
            html_escape("<a href='x'>&\"</a>"),
            "&lt;a href=&#39;x&#39;&gt;&amp;&#34;&lt;/a&gt;"
        );
        assert_eq!(html_escape("plain.txt"), "plain.txt");
    }

    #[test]
    fn test_rows_and_sizes() {
        let entries = Fixed(vec![("a.txt", false, 10), ("sub", true, -1)]);
        let html = render_listing(&entries, "/", ListingOptions::default()).unwrap();

        assert!(html.contains("<title>\nIndex of /\n</title>"));
        assert!(html.contains("<a href=\"../\">../</a>"));
        assert!(html.contains("<a href=\"a.txt\">a.txt</a>"));
        assert!(html.contains("<span class=\"item-size\">10B</span>"));
        assert!(html.contains("<a href=\"sub/\">sub/</a>"));
        assert!(html.contains("<span class=\"item-size\">-</span>"));

        let a = html.find("a.txt").unwrap();
        let sub = html.find("sub/").unwrap();
        assert!(a < sub);
    }

    #[test]
    fn test_exact_size() {
        let entries = Fixed(vec![("big.bin", false, 12_345)]);
        let options = ListingOptions {
            exact_size: true,
            ..ListingOptions::default()
        };
        let html = render_listing(&entries, "/", options).unwrap();
        assert!(html.contains("<span class=\"item-size\">12345</span>"));
    }

    #[test]
    fn test_names_are_escaped() {
        let entries = Fixed(vec![("what?#<b>.txt", false, 1)]);
        let html = render_listing(&entries, "/<script>", ListingOptions::default()).unwrap();

        assert!(html.contains("href=\"what%3F%23%3Cb%3E.txt\""));
        assert!(html.contains(">what?#&lt;b&gt;.txt</a>"));
        assert!(html.contains("Index of /&lt;script&gt;"));
        assert!(!html.contains("<script>"));
    }

    #[test]
    fn test_time_format_is_applied() {
        let entries = Fixed(vec![("a.txt", false, 1)]);
        let options = ListingOptions {
            time_format: "%Y",
            exact_size: false,
        };
        let html = render_listing(&entries, "/", options).unwrap();
        assert!(html.contains("<span class=\"item-time\">2023</span>"));
    }

    #[test]
    fn test_rendering_is_stable() {
        let entries = Fixed(vec![("a.txt", false, 10), ("sub", true, -1)]);
        let first = render_listing(&entries, "/dir/", ListingOptions::default()).unwrap();
        let second = render_listing(&entries, "/dir/", ListingOptions::default()).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_entry_sources_sort_by_bytes() {
        let dir = TempDir::new().unwrap();
        for name in ["b.txt", "B.txt", "a", "_x"] {
            fs::write(dir.path().join(name), name).unwrap();
        }
        fs::create_dir(dir.path().join("Zdir")).unwrap();

        let lazy = LazyEntries::read(dir.path()).unwrap();
        let names: Vec<&str> = (0..lazy.count()).map(|i| lazy.name(i)).collect();
        assert_eq!(names, vec!["B.txt", "Zdir", "_x", "a", "b.txt"]);
        assert!(lazy.is_dir(1));
        assert_eq!(lazy.size(1), -1);
        assert_eq!(lazy.size(4), 5);
        assert!(lazy.modified(4).is_some());

        let full = StatEntries::read(dir.path()).unwrap();
        let names: Vec<&str> = (0..full.count()).map(|i| full.name(i)).collect();
        assert_eq!(names, vec!["B.txt", "Zdir", "_x", "a", "b.txt"]);
        assert_eq!(full.size(0), 5);
    }

    #[cfg(unix)]
    #[test]
    fn test_full_stat_follows_directory_links() {
        let dir = TempDir::new().unwrap();
        fs::create_dir(dir.path().join("real")).unwrap();
        std::os::unix::fs::symlink(dir.path().join("real"), dir.path().join("link")).unwrap();

        let lazy = LazyEntries::read(dir.path()).unwrap();
        assert!(!lazy.is_dir(0)); // "link" is reported as a link
        let full = StatEntries::read(dir.path()).unwrap();
        assert!(full.is_dir(0));
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_non_utf8_names_keep_their_bytes() {
        use std::os::unix::ffi::OsStrExt;

        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("b.txt"), "b").unwrap();
        fs::write(dir.path().join("\u{e9}.txt"), "e").unwrap();
        // Lossily `\u{FFFD}a`, which would sort after the UTF-8 name
        fs::write(dir.path().join(OsStr::from_bytes(b"\x80a")), "x").unwrap();

        let sources: Vec<Box<dyn DirEntries>> = vec![
            Box::new(LazyEntries::read(dir.path()).unwrap()),
            Box::new(StatEntries::read(dir.path()).unwrap()),
        ];
        for entries in sources {
            let raw: Vec<&[u8]> = (0..entries.count()).map(|i| entries.raw_name(i)).collect();
            assert_eq!(raw, vec![&b"b.txt"[..], &b"\x80a"[..], "\u{e9}.txt".as_bytes()]);
            assert_eq!(entries.name(1), "\u{FFFD}a");

            let html = render_listing(entries.as_ref(), "/", ListingOptions::default()).unwrap();
            assert!(html.contains("<a href=\"%80a\">\u{FFFD}a</a>"));
            assert!(html.contains("<a href=\"%C3%A9.txt\">\u{e9}.txt</a>"));
        }
    }
}
