use pretty_assertions::assert_eq;

use cbrowse_parser::{ParseError, SourceSpan, SymbolTable};

use super::recorder::{events, parse_with};

fn owned(expected: &[&str]) -> Vec<String> {
    expected.iter().map(|s| s.to_string()).collect()
}

#[test]
fn classes_report_bases_and_nesting() {
    let text = r#"
namespace geo {
class Shape {
public:
    virtual ~Shape() = default;
    virtual double area() const = 0;
};
class Circle final : public Shape, private detail::Counted<Circle> {
    double r;
public:
    double area() const override { return 3.14 * r * r; }
};
}
"#;
    assert_eq!(
        events(text),
        owned(&[
            "ns geo",
            "Class Shape",
            "end class",
            "Class Circle : Shape, detail::Counted",
            "fn",
            "end fn",
            "end class",
            "end ns",
        ])
    );
}

#[test]
fn forward_declarations_and_elaborated_types_are_not_definitions() {
    let text = r#"
class Fwd;
struct Node* next(struct Node* n);
struct Point p = {1, 2};
"#;
    assert!(events(text).is_empty());
}

#[test]
fn typedef_forms() {
    let text = r#"
typedef unsigned long ulong, *pulong;
typedef void (*Callback)(int, void*);
typedef struct tagPOINT { int x; int y; } POINT, *PPOINT;
typedef enum { Red, Green } Color;
using Map = std::map<int, std::string>;
using namespace std;
using Base::Base;
template <typename T> using Vec = std::vector<T>;
"#;
    assert_eq!(
        events(text),
        owned(&[
            "typedef ulong",
            "typedef pulong",
            "typedef Callback",
            "Struct tagPOINT",
            "end class",
            "typedef POINT",
            "typedef PPOINT",
            "typedef Color",
            "typedef Map",
            "typedef Vec",
        ])
    );
}

#[test]
fn enums_with_bodies_are_declared() {
    let text = r#"
enum Color { Red, Green = 2 };
enum class Mode : unsigned char { A, B };
enum class Opaque : int;
namespace ui { enum Align { Left }; }
"#;
    assert_eq!(
        events(text),
        owned(&["enum Color", "enum Mode", "ns ui", "enum Align", "end ns"])
    );
}

#[test]
fn function_bodies_bracket_local_declarations() {
    let text = r#"
Widget::Widget(int w) : width_(w), cache_{} {
    struct Local { int v; };
    if (w > 0) { helper(); }
}
int global = compute();
int values[] = {1, 2, 3};
"#;
    assert_eq!(
        events(text),
        owned(&["fn", "Struct Local", "end class", "end fn"])
    );
}

#[test]
fn includes_and_nested_namespace_definitions() {
    let text = "#include \"shapes.h\"\n#include <vector>\nnamespace a::b { class C; }\n";
    assert_eq!(
        events(text),
        owned(&[
            "include \"shapes.h\"",
            "include <vector>",
            "ns a",
            "ns b",
            "end ns",
            "end ns",
        ])
    );
}

#[test]
fn anonymous_inline_and_linkage_scopes() {
    let text = r#"
namespace { struct Hidden {}; }
inline namespace v1 { }
extern "C" { struct S { int a; }; }
"#;
    assert_eq!(
        events(text),
        owned(&[
            "ns ",
            "Struct Hidden",
            "end class",
            "end ns",
            "ns v1",
            "end ns",
            "Struct S",
            "end class",
        ])
    );
}

#[test]
fn templates_and_specializations() {
    let text = r#"
template <typename T, int N = (3 > 2)> class Array : public Base<T, N> { };
template <> struct Hash<int> { };
"#;
    assert_eq!(
        events(text),
        owned(&[
            "Class Array : Base",
            "end class",
            "Struct Hash",
            "end class",
        ])
    );
}

#[test]
fn empty_macros_from_the_symbol_table_are_removed() {
    let text = "BEGIN_NAMESPACE class Foo {}; END_NAMESPACE";
    assert!(events(text).is_empty());

    let symbols = SymbolTable::new()
        .define("BEGIN_NAMESPACE", "")
        .define("END_NAMESPACE", "");
    let recorder = parse_with(text, &symbols).unwrap();
    assert_eq!(recorder.events, owned(&["Class Foo", "end class"]));
}

#[test]
fn spans_cover_declared_names() {
    let recorder = parse_with("namespace n { class Foo {}; }", &SymbolTable::new()).unwrap();
    assert_eq!(
        recorder.spans,
        vec![
            ("n".to_string(), SourceSpan { offset: 10, length: 1 }),
            ("Foo".to_string(), SourceSpan { offset: 20, length: 3 }),
        ]
    );
}

#[test]
fn visitor_can_stop_the_parse_early() {
    let mut recorder = super::recorder::Recorder {
        stop_after: Some(1),
        ..Default::default()
    };
    cbrowse_parser::StructuralParser::parse(
        &cbrowse_parser::OutlineParser::new(),
        std::path::Path::new("/src/a.cpp"),
        "class A {}; class B {};",
        &SymbolTable::new(),
        &mut recorder,
    )
    .unwrap();
    assert_eq!(recorder.events, owned(&["Class A"]));
}

#[test]
fn brace_errors_are_reported() {
    assert_eq!(
        parse_with("}", &SymbolTable::new()).err(),
        Some(ParseError::UnbalancedBraces { position: 0 })
    );
    assert_eq!(
        parse_with("namespace a {", &SymbolTable::new()).err(),
        Some(ParseError::UnexpectedEof { open: 1 })
    );
    assert!(matches!(
        parse_with("/* open", &SymbolTable::new()),
        Err(ParseError::UnterminatedComment { .. })
    ));
}
