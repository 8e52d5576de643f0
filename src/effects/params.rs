//! Effect parameter maps.
//!
//! Parameters arrive from the host UI or from scene persistence as loose
//! JSON; effects read them through the typed accessors with explicit
//! defaults.

use std::collections::HashMap;

pub type ParamMap = HashMap<String, serde_json::Value>;

pub fn param_f32(params: &ParamMap, key: &str, default: f32) -> f32 {
    params
        .get(key)
        .and_then(|v| v.as_f64())
        .map(|v| v as f32)
        .unwrap_or(default)
}

pub fn param_bool(params: &ParamMap, key: &str, default: bool) -> bool {
    params.get(key).and_then(|v| v.as_bool()).unwrap_or(default)
}

pub fn param_str<'a>(params: &'a ParamMap, key: &str, default: &'a str) -> &'a str {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accessors_fall_back_on_missing_or_mistyped_values() {
        let mut params = ParamMap::new();
        params.insert("strength".into(), serde_json::json!(0.75));
        params.insert("enabled".into(), serde_json::json!(true));
        params.insert("mode".into(), serde_json::json!("ripple"));
        params.insert("bad".into(), serde_json::json!([1, 2]));

        assert_eq!(param_f32(&params, "strength", 0.0), 0.75);
        assert_eq!(param_f32(&params, "missing", 0.5), 0.5);
        assert_eq!(param_f32(&params, "bad", 0.25), 0.25);
        assert!(param_bool(&params, "enabled", false));
        assert!(!param_bool(&params, "missing", false));
        assert_eq!(param_str(&params, "mode", "flat"), "ripple");
        assert_eq!(param_str(&params, "bad", "flat"), "flat");
    }
}
