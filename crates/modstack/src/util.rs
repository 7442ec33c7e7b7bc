use crate::function::FunctionSchema;
use crate::path::Path;
use crate::source_map::{get_resource_property_source, PropertySource};
use crate::visit::{self, VisitObjectsMut};
use serde_json::{Map, Value};

/// Give every unqualified reference the module that supplied it
///
/// Covers `{ Ref: { resource } }` objects and the middleware entries of the function keyword. The module is taken
/// from the [PropertySource] attribution at the path of the reference.
pub fn qualify_references(properties: &mut Value, source_map: &PropertySource, schema: &FunctionSchema) {
    let mut rewriter = ReferenceQualifier::new(source_map, schema);
    properties.visit_objects_mut(&mut rewriter);
}

#[derive(derive_new::new)]
pub(crate) struct ReferenceQualifier<'s> {
    source_map: &'s PropertySource,
    schema: &'s FunctionSchema,
}

impl ReferenceQualifier<'_> {
    fn module_at(&self, path: &Path) -> Value {
        Value::String(get_resource_property_source(path, self.source_map).module)
    }

    fn qualify(&self, address: &mut Value, path: &Path) {
        let Some(address) = address.as_object_mut() else {
            return;
        };

        // plain references and already qualified ones
        if address.contains_key("module") || !address.contains_key("resource") {
            return;
        }

        let module = self.module_at(path);
        tracing::trace!(%path, %module, "qualify reference");
        address.insert("module".to_string(), module);
    }
}

impl visit::VisitMut<Map<String, Value>> for ReferenceQualifier<'_> {
    fn visit_mut(&mut self, path: &Path, object: &mut Map<String, Value>) {
        if let Some(reference) = object.get_mut(&self.schema.reference_keyword) {
            self.qualify(reference, path);
        }

        let Some(middlewares) = object
            .get_mut(&self.schema.function_keyword)
            .and_then(|function| function.get_mut(&self.schema.middlewares_field))
            .and_then(Value::as_array_mut)
        else {
            return;
        };

        let middlewares_path = path
            .child(self.schema.function_keyword.as_str())
            .child(self.schema.middlewares_field.as_str());
        for (index, middleware) in middlewares.iter_mut().enumerate() {
            self.qualify(middleware, &middlewares_path.child(index));
        }
    }
}
