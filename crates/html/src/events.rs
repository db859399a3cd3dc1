//! Inline event handler attributes (`onclick="save(...)"`).

/// How the arguments of an inline handler call are written.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ArgumentStyle {
    /// Write arguments verbatim instead of wrapping each in double quotes.
    pub raw: bool,
    /// Pass the element itself (`this`) as the first argument.
    pub with_element: bool,
}

impl ArgumentStyle {
    /// Every argument becomes a string literal.
    pub const QUOTED: Self = Self {
        raw: false,
        with_element: false,
    };

    /// Arguments are inserted as JavaScript expressions.
    pub const RAW: Self = Self {
        raw: true,
        with_element: false,
    };

    /// Same style, with `this` prepended to the argument list.
    #[must_use]
    pub const fn with_element(self) -> Self {
        Self {
            with_element: true,
            ..self
        }
    }
}

/// Build the `(name, value)` pair of an `on<event>` attribute calling `function`.
///
/// # Examples
/// ```
/// use html::events::{ArgumentStyle, handler_attribute};
/// let (name, value) = handler_attribute("click", "save", &["10"], ArgumentStyle::QUOTED);
/// assert_eq!(name, "onclick");
/// assert_eq!(value, r#"save("10")"#);
/// ```
pub fn handler_attribute(
    event: &str,
    function: &str,
    args: &[&str],
    style: ArgumentStyle,
) -> (String, String) {
    let joined = args
        .iter()
        .map(|arg| {
            if style.raw {
                (*arg).to_owned()
            } else {
                format!("\"{arg}\"")
            }
        })
        .collect::<Vec<_>>()
        .join(",");
    let call_args = match (style.with_element, joined.is_empty()) {
        (true, true) => String::from("this"),
        (true, false) => format!("this, {joined}"),
        (false, _) => joined,
    };
    (
        format!("on{}", event.to_ascii_lowercase()),
        format!("{function}({call_args})"),
    )
}
