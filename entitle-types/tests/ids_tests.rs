use entitle_types::ProductId;
use std::collections::HashSet;

#[test]
fn product_id_display_and_parse() {
    let id: ProductId = "pro_upgrade".parse().unwrap();
    assert_eq!(id.to_string(), "pro_upgrade");
    assert_eq!(id.as_str(), "pro_upgrade");
    assert_eq!(id, "pro_upgrade");
}

#[test]
fn product_id_conversions() {
    let a = ProductId::from("remove_ads");
    let b = ProductId::from(String::from("remove_ads"));
    let c = ProductId::new("remove_ads");
    assert_eq!(a, b);
    assert_eq!(b, c);
}

#[test]
fn product_id_is_empty() {
    assert!(ProductId::new("").is_empty());
    assert!(!ProductId::new("x").is_empty());
}

#[test]
fn product_id_hash_dedup() {
    let mut set = HashSet::new();
    set.insert(ProductId::from("a"));
    set.insert(ProductId::from("a"));
    set.insert(ProductId::from("b"));
    assert_eq!(set.len(), 2);
}

#[test]
fn product_id_serde_transparent() {
    let id = ProductId::from("pro_upgrade");
    let json = serde_json::to_string(&id).unwrap();
    assert_eq!(json, "\"pro_upgrade\"");
    let parsed: ProductId = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, id);
}
