//! Minimal XML property-list writer and reader.
//!
//! Only what bundle and package metadata need: strings, integers, arrays and
//! ordered dictionaries on the write side, top-level string lookup on the
//! read side.

use std::fmt::Write;

/// A property-list value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plist {
    String(String),
    Integer(i64),
    Array(Vec<Plist>),
    /// Keys are written in insertion order.
    Dict(Vec<(String, Plist)>),
}

impl Plist {
    pub fn string(s: impl Into<String>) -> Self {
        Self::String(s.into())
    }

    pub fn dict<K: Into<String>>(entries: impl IntoIterator<Item = (K, Plist)>) -> Self {
        Self::Dict(entries.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Render a complete XML document.
    pub fn to_xml(&self) -> String {
        let mut out = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \
             \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
             <plist version=\"1.0\">\n",
        );
        self.write_value(&mut out, 0);
        out.push_str("</plist>\n");
        out
    }

    fn write_value(&self, out: &mut String, depth: usize) {
        let indent = "\t".repeat(depth);
        match self {
            Self::String(s) => {
                let _ = writeln!(out, "{indent}<string>{}</string>", escape(s));
            }
            Self::Integer(i) => {
                let _ = writeln!(out, "{indent}<integer>{i}</integer>");
            }
            Self::Array(items) => {
                let _ = writeln!(out, "{indent}<array>");
                for item in items {
                    item.write_value(out, depth + 1);
                }
                let _ = writeln!(out, "{indent}</array>");
            }
            Self::Dict(entries) => {
                let _ = writeln!(out, "{indent}<dict>");
                for (key, value) in entries {
                    let _ = writeln!(out, "{indent}\t<key>{}</key>", escape(key));
                    value.write_value(out, depth + 1);
                }
                let _ = writeln!(out, "{indent}</dict>");
            }
        }
    }

    /// Look up a string value by key in a dictionary.
    pub fn get_string(&self, key: &str) -> Option<&str> {
        match self {
            Self::Dict(entries) => entries.iter().find_map(|(k, v)| match v {
                Self::String(s) if k == key => Some(s.as_str()),
                _ => None,
            }),
            _ => None,
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// First `<string>` value following `<key>{key}</key>` in an XML plist.
pub fn lookup_string(xml: &str, key: &str) -> Option<String> {
    let marker = format!("<key>{}</key>", escape(key));
    let after = &xml[xml.find(&marker)? + marker.len()..];
    let rest = after.trim_start();
    let value = rest.strip_prefix("<string>")?;
    let end = value.find("</string>")?;
    Some(unescape(&value[..end]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_nested_document() {
        let plist = Plist::dict([
            ("CFBundleName", Plist::string("H3")),
            ("UIDeviceFamily", Plist::Array(vec![Plist::Integer(1), Plist::Integer(2)])),
        ]);
        let xml = plist.to_xml();
        assert!(xml.starts_with("<?xml"));
        assert!(xml.contains("\t<key>CFBundleName</key>\n\t<string>H3</string>"));
        assert!(xml.contains("<integer>2</integer>"));
        assert!(xml.trim_end().ends_with("</plist>"));
    }

    #[test]
    fn lookup_round_trips_escaped_values() {
        let plist = Plist::dict([("CFBundleIdentifier", Plist::string("org.example.a&b"))]);
        let xml = plist.to_xml();
        assert!(xml.contains("a&amp;b"));
        assert_eq!(
            lookup_string(&xml, "CFBundleIdentifier").as_deref(),
            Some("org.example.a&b")
        );
        assert_eq!(lookup_string(&xml, "Missing"), None);
        assert_eq!(plist.get_string("CFBundleIdentifier"), Some("org.example.a&b"));
    }
}
