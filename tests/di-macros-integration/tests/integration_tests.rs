use di_abstractions::{BeansDescriptor, ComponentType};
use di_common::{builtin, Marker, MarkerLiteral, MarkerValue};
use di_impl::Container;
use di_macros::Marker;
use std::sync::Arc;

#[derive(Marker)]
#[marker(qualifier)]
struct Region {
    code: String,
    #[marker(nonbinding)]
    note: String,
}

impl Region {
    fn new(code: &str, note: &str) -> Self {
        Self {
            code: code.to_string(),
            note: note.to_string(),
        }
    }
}

#[derive(Marker)]
#[marker(qualifier, kind = "Tier")]
struct TierLevel(i64);

#[derive(Marker)]
#[marker(stereotype, carries(ApplicationScoped, Alternative))]
struct Mock;

#[derive(Marker)]
#[marker(interceptor_binding, carries(Audited))]
struct Tracked;

trait Store: Send + Sync {
    fn region(&self) -> &'static str;
}

#[derive(Default)]
struct EuStore;

impl Store for EuStore {
    fn region(&self) -> &'static str {
        "eu"
    }
}

#[derive(Default)]
struct UsStore;

impl Store for UsStore {
    fn region(&self) -> &'static str {
        "us"
    }
}

#[derive(Default)]
struct MockStore;

impl Store for MockStore {
    fn region(&self) -> &'static str {
        "mock"
    }
}

#[test]
fn test_literal_members_and_kind() {
    assert_eq!(Region::KIND, "Region");
    let marker = Region::new("eu", "primary").to_marker();
    assert!(marker.is("Region"));
    assert_eq!(marker.member("code"), Some(&MarkerValue::from("eu")));
    assert_eq!(marker.member("note"), Some(&MarkerValue::from("primary")));

    let tier = TierLevel(2).to_marker();
    assert_eq!(TierLevel::KIND, "Tier");
    assert_eq!(tier.value().and_then(MarkerValue::as_int), Some(2));
}

#[test]
fn test_definitions_carry_roles() {
    let region = Region::definition();
    assert!(region.has_meta(builtin::QUALIFIER));
    assert!(region.nonbinding().contains("note"));

    let mock = Mock::definition();
    assert!(mock.has_meta(builtin::STEREOTYPE));
    let carried: Vec<&str> = mock.carried().map(Marker::kind).collect();
    assert_eq!(carried, vec!["ApplicationScoped", "Alternative"]);

    let tracked = Tracked::definition();
    assert!(tracked.has_meta(builtin::INTERCEPTOR_BINDING));
    assert!(tracked.has_meta("Audited"));
}

#[test]
fn test_qualifier_literal_selects_bean_ignoring_nonbinding_members() {
    let container = Container::builder()
        .declare_literal::<Region>()
        .add_type(
            ComponentType::builder::<EuStore>()
                .marker(Marker::application_scoped())
                .marker(Region::new("eu", "primary").to_marker())
                .implements::<dyn Store>(|store| store as Arc<dyn Store>)
                .with_default()
                .build(),
        )
        .add_type(
            ComponentType::builder::<UsStore>()
                .marker(Marker::application_scoped())
                .marker(Region::new("us", "primary").to_marker())
                .implements::<dyn Store>(|store| store as Arc<dyn Store>)
                .with_default()
                .build(),
        )
        .build()
        .unwrap();

    let store = container
        .select::<dyn Store>(&[Region::new("eu", "anything").to_marker()])
        .unwrap();
    assert_eq!(store.region(), "eu");
    assert!(container.select::<dyn Store>(&[]).is_err());
}

#[test]
fn test_stereotype_literal_bundles_scope_and_alternative() {
    let container = Container::builder()
        .declare_literal::<Mock>()
        .with_descriptor(BeansDescriptor::new().enable_alternative(Mock::KIND))
        .add_type(
            ComponentType::builder::<EuStore>()
                .marker(Marker::application_scoped())
                .implements::<dyn Store>(|store| store as Arc<dyn Store>)
                .with_default()
                .build(),
        )
        .add_type(
            ComponentType::builder::<MockStore>()
                .marker(Mock.to_marker())
                .implements::<dyn Store>(|store| store as Arc<dyn Store>)
                .with_default()
                .build(),
        )
        .build()
        .unwrap();

    let first = container.select::<dyn Store>(&[]).unwrap();
    let second = container.select::<dyn Store>(&[]).unwrap();
    assert_eq!(first.region(), "mock");
    assert!(Arc::ptr_eq(&first, &second));
}
