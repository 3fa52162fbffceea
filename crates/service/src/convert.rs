use schema::{Resources, Value};
use shred::{reassemble, shred, Action, Bundle, QueryResult};

/// ConvertService exposes the shred/reassemble pair as a remote service:
/// POST turns elements into their relational bundle, GET turns a bundle
/// back into elements. The bundle travels in its serde wire form.
pub struct ConvertService {
    res: Resources,
}

impl ConvertService {
    pub fn new(res: Resources) -> Self {
        Self { res }
    }

    pub fn post(&self, elements: &[Value]) -> anyhow::Result<Bundle> {
        Ok(shred(Action::Post, elements, &[], &self.res)?)
    }

    pub fn get(&self, bundle: &Bundle) -> anyhow::Result<QueryResult> {
        Ok(reassemble(bundle, None, &self.res)?)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use schema::{Record, TypeDef, TypeRegistry};
    use std::sync::Arc;

    #[test]
    fn shreds_and_reassembles_over_the_wire_form() {
        let registry = TypeRegistry::new();
        registry
            .register(TypeDef::new("Item").field("ItemId", "string"))
            .unwrap();
        registry.decorate_primary("Item", &["ItemId"]);
        let service = ConvertService::new(Resources::new(Arc::new(registry)));

        let item = Value::Record(Record::new("Item").set("ItemId", Value::str("i1")));
        let bundle = service.post(std::slice::from_ref(&item)).unwrap();

        // The wire round trip preserves the bundle bit-for-bit.
        let encoded = serde_json::to_vec(&bundle).unwrap();
        let decoded: Bundle = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded, bundle);

        let result = service.get(&decoded).unwrap();
        assert_eq!(result.elements, vec![item]);
    }
}
