use di_common::MarkerLiteral;
use di_macros::Marker;

#[derive(Marker)]
#[marker(normal_scope)]
struct SessionScoped;

#[derive(Marker)]
#[marker(qualifier)]
struct Weight {
    grams: i64,
    labels: Vec<String>,
}

fn main() {
    assert_eq!(SessionScoped::KIND, "SessionScoped");
    let weight = Weight {
        grams: 5,
        labels: vec!["fresh".to_string()],
    };
    assert!(weight.to_marker().member("labels").is_some());
    assert!(Weight::definition().nonbinding().is_empty());
}
