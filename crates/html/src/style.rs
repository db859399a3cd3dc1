//! `style="..."` attribute handling.
//! See <https://www.w3.org/TR/css-style-attr/>

/// A single declaration parsed from a style attribute.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Declaration {
    /// Property name normalized to ASCII lowercase.
    pub property: String,
    /// Raw value trimmed of surrounding ASCII whitespace. May contain spaces.
    pub value: String,
}

/// Parse the value of a `style` attribute into a list of declarations.
///
/// Splits on `;`, then on the first `:` of each item. Items without a colon or
/// with an empty property or value are skipped. Source order is kept and
/// duplicates are not folded.
pub fn parse_declarations(input: &str) -> Vec<Declaration> {
    let mut out = Vec::new();
    for raw_item in input.split(';') {
        let Some((raw_prop, raw_value)) = raw_item.split_once(':') else {
            continue;
        };
        let property_text = raw_prop.trim_matches(is_ascii_whitespace);
        let value_text = raw_value.trim_matches(is_ascii_whitespace);
        if property_text.is_empty() || value_text.is_empty() {
            continue;
        }
        out.push(Declaration {
            property: property_text.to_ascii_lowercase(),
            value: value_text.to_owned(),
        });
    }
    out
}

/// Value of `property` inside a style attribute; the last declaration wins.
pub fn property(style: &str, property: &str) -> Option<String> {
    let wanted = property.to_ascii_lowercase();
    parse_declarations(style)
        .into_iter()
        .rev()
        .find(|decl| decl.property == wanted)
        .map(|decl| decl.value)
}

/// Rewrite a style attribute with `property` set to `value`.
///
/// Existing declarations keep their order and the first occurrence of the
/// property is replaced in place; otherwise it is appended. The result is
/// serialized as `name: value;` items with no separator, e.g.
/// `width: 100%;height: 1000px;`.
pub fn set_property(style: Option<&str>, property: &str, value: &str) -> String {
    let wanted = property.to_ascii_lowercase();
    let mut replaced = false;
    let mut out = String::new();
    for decl in parse_declarations(style.unwrap_or_default()) {
        if decl.property == wanted {
            if replaced {
                continue;
            }
            replaced = true;
            push_declaration(&mut out, &decl.property, value);
        } else {
            push_declaration(&mut out, &decl.property, &decl.value);
        }
    }
    if !replaced {
        push_declaration(&mut out, &wanted, value);
    }
    out
}

fn push_declaration(out: &mut String, property: &str, value: &str) {
    out.push_str(property);
    out.push_str(": ");
    out.push_str(value.trim_matches(is_ascii_whitespace));
    out.push(';');
}

/// ASCII whitespace per CSS Syntax (TAB, LF, FF, CR, SPACE).
///
/// See <https://www.w3.org/TR/css-syntax-3/#whitespace>
const fn is_ascii_whitespace(character: char) -> bool {
    matches!(
        character,
        '\u{0009}' | '\u{000A}' | '\u{000C}' | '\u{000D}' | '\u{0020}'
    )
}
