use std::collections::HashMap;

use crate::event_schema::Property;

/// Flat string properties for one event.
///
/// Defaults are inserted first; caller supplied properties are overlaid
/// afterwards and win on key collision.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PropertyMap {
    inner: HashMap<String, String>,
}

impl PropertyMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, property: Property, value: impl Into<String>) -> &mut Self {
        self.inner.insert(property.as_str().to_string(), value.into());
        self
    }

    /// Inserts only when `value` is present and non-empty.
    pub fn insert_if_present(&mut self, property: Property, value: Option<&str>) -> &mut Self {
        if let Some(value) = value.filter(|v| !v.is_empty()) {
            self.insert(property, value);
        }
        self
    }

    pub fn overlay(&mut self, additional: Option<&HashMap<String, String>>) -> &mut Self {
        if let Some(additional) = additional {
            for (key, value) in additional {
                self.inner.insert(key.clone(), value.clone());
            }
        }
        self
    }

    /// Aggregates `items` into one `key=value, key=value` property.
    ///
    /// Pairs are sorted by key so the rendered string is stable.
    pub fn insert_items(
        &mut self,
        property: Property,
        items: Option<&HashMap<String, String>>,
    ) -> &mut Self {
        if let Some(rendered) = items.and_then(render_items) {
            self.insert(property, rendered);
        }
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.inner.get(key).map(String::as_str)
    }

    pub fn contains(&self, property: Property) -> bool {
        self.inner.contains_key(property.as_str())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn into_inner(self) -> HashMap<String, String> {
        self.inner
    }
}

impl From<HashMap<String, String>> for PropertyMap {
    fn from(inner: HashMap<String, String>) -> Self {
        Self { inner }
    }
}

fn render_items(items: &HashMap<String, String>) -> Option<String> {
    if items.is_empty() {
        return None;
    }
    let mut pairs: Vec<(&String, &String)> = items.iter().collect();
    pairs.sort_by(|a, b| a.0.cmp(b.0));
    Some(
        pairs
            .into_iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(", "),
    )
}
