use super::VisitMut;
use crate::path::Path;
use serde_json::{Map, Value};

/// Recursively visit all json objects mutably
///
/// Objects are visited before their children, so a visitor sees the children it added or changed on the way down.
pub trait VisitObjectsMut {
    fn visit_objects_mut(&mut self, visitor: &mut dyn VisitMut<Map<String, Value>>);
}

impl VisitObjectsMut for Value {
    fn visit_objects_mut(&mut self, visitor: &mut dyn VisitMut<Map<String, Value>>) {
        visit(self, &Path::root(), visitor);
    }
}

fn visit(value: &mut Value, path: &Path, visitor: &mut dyn VisitMut<Map<String, Value>>) {
    match value {
        Value::Object(object) => {
            visitor.visit_mut(path, object);
            for (key, child) in object.iter_mut() {
                visit(child, &path.child(key.as_str()), visitor);
            }
        }
        Value::Array(items) => {
            for (index, child) in items.iter_mut().enumerate() {
                visit(child, &path.child(index), visitor);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn visits_objects_parent_first() {
        let mut value = json!({ "a": [{ "b": {} }, 1], "c": {} });
        let mut seen = vec![];
        value.visit_objects_mut(&mut |path: &Path, object: &mut Map<String, Value>| {
            seen.push(path.to_string());
            object.insert("seen".to_string(), json!(true));
        });

        assert_eq!(seen, ["<root>", "a.0", "a.0.b", "c"]);
        assert_eq!(value["a"][0]["b"]["seen"], json!(true));
    }
}
