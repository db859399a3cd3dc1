use html::style::{parse_declarations, set_property};
use html::{ArgumentStyle, Element, ElementQuery};

#[test]
fn style_properties_keep_order_and_replace_in_place() {
    let mut element = Element::new("div");
    element.set_width("100%");
    element.set_height("1000px");
    assert_eq!(
        element.attribute("style"),
        Some("width: 100%;height: 1000px;")
    );
    element.set_width("50%");
    assert_eq!(
        element.attribute("style"),
        Some("width: 50%;height: 1000px;")
    );
    assert_eq!(element.width().as_deref(), Some("50%"));
    assert_eq!(element.style_property("HEIGHT").as_deref(), Some("1000px"));
    assert_eq!(element.style_property("color"), None);
}

#[test]
fn style_parsing_skips_broken_items() {
    let declarations = parse_declarations(" Color : red ; ; nonsense; margin:  0 auto ;x:");
    let pairs: Vec<(&str, &str)> = declarations
        .iter()
        .map(|decl| (decl.property.as_str(), decl.value.as_str()))
        .collect();
    assert_eq!(pairs, [("color", "red"), ("margin", "0 auto")]);
    assert_eq!(set_property(None, "border", "none"), "border: none;");
}

#[test]
fn event_handlers_quote_or_pass_raw_arguments() {
    let mut button = Element::new("button");
    button.onclick("printValue", &["10"], ArgumentStyle::QUOTED);
    assert_eq!(button.attribute("onclick"), Some("printValue(\"10\")"));
    button.onclick("printValue", &["10", "x"], ArgumentStyle::RAW);
    assert_eq!(button.attribute("onclick"), Some("printValue(10,x)"));
    button.on("MouseOver", "hover", &[], ArgumentStyle::QUOTED.with_element());
    assert_eq!(button.attribute("onmouseover"), Some("hover(this)"));
    button.on("change", "picked", &["a"], ArgumentStyle::QUOTED.with_element());
    assert_eq!(button.attribute("onchange"), Some("picked(this, \"a\")"));
}

#[test]
fn iframe_builder_sets_embed_attributes() {
    let frame = Element::iframe(Some("/child"), true);
    assert_eq!(
        frame.to_markup(),
        concat!(
            "<iframe style=\"border: none;\" marginwidth=\"0\" marginheight=\"0\" ",
            "align=\"center\" onload=\"_resizeEmbed(this)\" src=\"/child\"></iframe>"
        )
    );
    let bordered = Element::iframe(None, false);
    assert!(!bordered.has_attribute("style"));
    assert!(!bordered.has_attribute("src"));
}

#[test]
fn ids_and_values() {
    let mut input = Element::from_markup("<input value=\"2\">").unwrap();
    assert_eq!(input.value(), Some("2"));
    input.set_value("3");
    assert_eq!(input.value(), Some("3"));
    assert_eq!(input.id(), None);
    let generated = input.ensure_id();
    assert_eq!(input.id(), Some(generated.as_str()));
    assert_eq!(input.ensure_id(), generated);
    input.set_id("fixed");
    assert_eq!(input.ensure_id(), "fixed");
}

#[test]
fn value_tree_lookups() {
    let form = Element::from_markup(concat!(
        "<form><input id=\"a\" name=\"first\" class=\"field wide\">",
        "<select><option value=\"1\">one</option><option value=\"2\" selected>two</option></select>",
        "</form>"
    ))
    .unwrap();
    assert_eq!(form.find_by_id("a").unwrap().attribute("name"), Some("first"));
    assert_eq!(
        form.find_all(&ElementQuery::any().with_class("wide")).len(),
        1
    );
    assert_eq!(form.find_all(&ElementQuery::tag("option")).len(), 2);
    assert_eq!(form.selected_option().unwrap().value(), Some("2"));
    assert_eq!(
        form.child_elements().map(Element::tag_name).collect::<Vec<_>>(),
        ["input", "select"]
    );
    assert_eq!(
        form.find_by_id("a").unwrap().selector(),
        "input[id=\"a\"][name=\"first\"][class=\"field wide\"]"
    );
}
