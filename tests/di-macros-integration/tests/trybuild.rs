//! trybuild 编译期测试

#[test]
fn trybuild_marker_derive() {
    let t = trybuild::TestCases::new();
    t.pass("tests/trybuild/marker_ok.rs");
}
