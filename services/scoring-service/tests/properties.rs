use proptest::prelude::*;
use scoring_service::{score, DEFAULT_FEATURES};
use serve_core::{FeatureSchema, ModelHandle, ServeError};
use std::path::PathBuf;

fn model() -> ModelHandle {
    ModelHandle::load(&PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../models/baseline.json"), None)
}

proptest! {
    #[test]
    fn score_is_a_probability(x1 in -1.0e6f64..1.0e6, x2 in -1.0e6f64..1.0e6) {
        let schema = FeatureSchema::new(DEFAULT_FEATURES);
        let body = serde_json::to_vec(&serde_json::json!({"x1": x1, "x2": x2})).unwrap();
        let r = score(&schema, &model(), &body).unwrap();
        prop_assert!((0.0..=1.0).contains(&r.score));
    }

    #[test]
    fn non_numeric_field_is_validation_error(junk in "[a-zA-Z_ ]{1,12}", which in 0usize..2) {
        let schema = FeatureSchema::new(DEFAULT_FEATURES);
        let mut body = serde_json::json!({"x1": 1.0, "x2": 2.0});
        body[DEFAULT_FEATURES[which]] = serde_json::Value::String(junk.clone());
        let res = score(&schema, &model(), &serde_json::to_vec(&body).unwrap());
        // alphabetic strings such as "inf" or "NaN" parse as floats but are not finite
        prop_assert!(matches!(res, Err(ServeError::Validation(_))), "{junk:?} -> {res:?}");
    }

    #[test]
    fn missing_field_is_validation_error(which in 0usize..2) {
        let schema = FeatureSchema::new(DEFAULT_FEATURES);
        let mut body = serde_json::json!({"x1": 1.0, "x2": 2.0});
        body.as_object_mut().unwrap().remove(DEFAULT_FEATURES[which]);
        let res = score(&schema, &model(), &serde_json::to_vec(&body).unwrap());
        prop_assert!(matches!(res, Err(ServeError::Validation(_))));
    }
}
