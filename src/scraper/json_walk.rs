//! Bounded key search over decoded JSON

use serde_json::Value;

/// Collects the values stored under any of a fixed set of keys, searching
/// nested objects and arrays no deeper than `max_depth` levels below the root.
///
/// A matched value is returned as is and not searched further.
#[derive(Debug, Clone)]
pub struct JsonKeyWalker {
    keys: Vec<String>,
    max_depth: usize,
}

impl JsonKeyWalker {
    pub fn new<I, S>(keys: I, max_depth: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            keys: keys.into_iter().map(Into::into).collect(),
            max_depth,
        }
    }

    pub fn find<'v>(&self, root: &'v Value) -> Vec<&'v Value> {
        let mut found = Vec::new();
        self.walk(root, 0, &mut found);
        found
    }

    fn walk<'v>(&self, value: &'v Value, depth: usize, found: &mut Vec<&'v Value>) {
        if depth > self.max_depth {
            return;
        }

        match value {
            Value::Object(map) => {
                for (key, child) in map {
                    if self.keys.iter().any(|k| k == key) {
                        found.push(child);
                    } else if is_container(child) {
                        self.walk(child, depth + 1, found);
                    }
                }
            }
            Value::Array(items) => {
                for item in items.iter().filter(|item| is_container(item)) {
                    self.walk(item, depth + 1, found);
                }
            }
            _ => {}
        }
    }
}

fn is_container(value: &Value) -> bool {
    matches!(value, Value::Object(_) | Value::Array(_))
}
