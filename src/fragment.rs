//! `name=value` pairs persisted in the address fragment.

use std::sync::Mutex;
use url::Url;

use crate::error::FragmentError;

/// Names and values are restricted to `[A-Za-z0-9_+-]+`.
pub fn is_valid_token(s: &str) -> bool {
    !s.is_empty()
        && s
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || matches!(b, b'_' | b'+' | b'-'))
}

/// Holds the fragment text without its leading `#`.
#[derive(Debug, Default)]
pub struct UrlFragmentStore {
    pairs: Mutex<String>,
}

impl UrlFragmentStore {
    pub fn new(fragment: &str) -> Self {
        Self {
            pairs: Mutex::new(fragment.trim_start_matches('#').to_string()),
        }
    }

    pub fn from_url(url: &Url) -> Self {
        Self::new(url.fragment().unwrap_or(""))
    }

    pub fn read(&self, name: &str) -> Option<String> {
        let pairs = self.snapshot();
        pairs
            .split('&')
            .filter_map(|segment| segment.split_once('='))
            .find(|(n, v)| *n == name && is_valid_token(v))
            .map(|(_, v)| v.to_string())
    }

    /// Sets `name` to `value`, touching only that entry's value segment.
    pub fn write(&self, name: &str, value: &str) -> Result<(), FragmentError> {
        if !is_valid_token(name) {
            return Err(FragmentError::InvalidName(name.to_string()));
        }
        if !is_valid_token(value) {
            return Err(FragmentError::InvalidValue {
                name: name.to_string(),
                value: value.to_string(),
            });
        }

        let mut pairs = match self.pairs.lock() {
            Ok(p) => p,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut replaced = false;
        let segments: Vec<String> = pairs
            .split('&')
            .filter(|s| !s.is_empty())
            .map(|segment| match segment.split_once('=') {
                Some((n, _)) if n == name && !replaced => {
                    replaced = true;
                    format!("{}={}", n, value)
                }
                _ => segment.to_string(),
            })
            .collect();
        let mut next = segments.join("&");
        if !replaced {
            if !next.is_empty() {
                next.push('&');
            }
            next.push_str(name);
            next.push('=');
            next.push_str(value);
        }
        *pairs = next;
        Ok(())
    }

    /// The fragment as it appears in the address, `#` included.
    pub fn fragment(&self) -> String {
        let pairs = self.snapshot();
        if pairs.is_empty() {
            String::new()
        } else {
            format!("#{}", pairs)
        }
    }

    pub fn apply_to(&self, url: &mut Url) {
        let pairs = self.snapshot();
        url.set_fragment(if pairs.is_empty() { None } else { Some(&pairs) });
    }

    fn snapshot(&self) -> String {
        match self.pairs.lock() {
            Ok(p) => p.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_exact_names() {
        let store = UrlFragmentStore::new("#nojit=on&jit=off&metric=mean");
        assert_eq!(store.read("jit").as_deref(), Some("off"));
        assert_eq!(store.read("nojit").as_deref(), Some("on"));
        assert_eq!(store.read("norm"), None);
    }

    #[test]
    fn rejects_values_outside_charset() {
        let store = UrlFragmentStore::new("#bench=a.b&ok=a+b-c_1");
        assert_eq!(store.read("bench"), None);
        assert_eq!(store.read("ok").as_deref(), Some("a+b-c_1"));
        assert!(matches!(
            store.write("bench", "a.b"),
            Err(FragmentError::InvalidValue { .. })
        ));
        assert!(matches!(store.write("a b", "x"), Err(FragmentError::InvalidName(_))));
        assert_eq!(store.fragment(), "#bench=a.b&ok=a+b-c_1");
    }

    #[test]
    fn write_into_empty_fragment() {
        let store = UrlFragmentStore::default();
        assert_eq!(store.fragment(), "");
        store.write("jit", "on").unwrap();
        assert_eq!(store.fragment(), "#jit=on");
    }

    #[test]
    fn write_is_idempotent() {
        let once = UrlFragmentStore::new("#a=1&b=2");
        once.write("c", "3").unwrap();
        let twice = UrlFragmentStore::new("#a=1&b=2");
        twice.write("c", "3").unwrap();
        twice.write("c", "3").unwrap();
        assert_eq!(once.fragment(), twice.fragment());
    }

    #[test]
    fn write_preserves_other_entries_and_order() {
        let store = UrlFragmentStore::new("#js=on&jit=on&d8=off");
        store.write("jit", "off").unwrap();
        assert_eq!(store.fragment(), "#js=on&jit=off&d8=off");
        store.write("metric", "min").unwrap();
        assert_eq!(store.fragment(), "#js=on&jit=off&d8=off&metric=min");
    }

    #[test]
    fn url_round_trip() {
        let url = Url::parse("https://example.org/bridge.html#jit=off").unwrap();
        let store = UrlFragmentStore::from_url(&url);
        store.write("js", "on").unwrap();
        let mut out = url.clone();
        store.apply_to(&mut out);
        assert_eq!(out.as_str(), "https://example.org/bridge.html#jit=off&js=on");
    }
}
