use super::*;

#[test]
fn identical_keys_hash_identically() {
    let a = ComputeKey::new("decode_frame", ["v.mp4".to_string(), "17".to_string()]);
    let b = ComputeKey::new("decode_frame", ["v.mp4".to_string(), "17".to_string()]);
    assert_eq!(a, b);
    assert_eq!(a.hash_id(), b.hash_id());
}

#[test]
fn argument_boundaries_are_not_ambiguous() {
    let a = ComputeKey::new("op", ["ab".to_string(), "c".to_string()]);
    let b = ComputeKey::new("op", ["a".to_string(), "bc".to_string()]);
    assert_ne!(a.hash_id(), b.hash_id());

    let c = ComputeKey::new("opx", ["y".to_string()]);
    let d = ComputeKey::new("op", ["xy".to_string()]);
    assert_ne!(c.hash_id(), d.hash_id());
}

#[test]
fn argument_order_matters() {
    let a = ComputeKey::new("op", ["1".to_string(), "2".to_string()]);
    let b = ComputeKey::new("op", ["2".to_string(), "1".to_string()]);
    assert_ne!(a.hash_id(), b.hash_id());
}

#[test]
fn display_shows_call_shape() {
    let key = ComputeKey::new("render_design", ["d.svg".to_string(), "400".to_string()]);
    assert_eq!(key.to_string(), "render_design(d.svg, 400)");
}
