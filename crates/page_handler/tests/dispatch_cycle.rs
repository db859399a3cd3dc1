use anyhow::Context as _;
use page_handler::{
    App, AppConfig, CallArgs, CallContext, Callable, DispatchError, Outcome, Page, PageTree as _,
    Rejection, Session, dispatch, handle_message,
};
use html::{ArgumentStyle, Element};
use protocol::{element_ref, ops};
use serde_json::{Value, json};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const CALCULATOR: &str = concat!(
    "<html><body>",
    "<input id=\"a\" value=\"2\"><input id=\"b\" value=\"3\">",
    "<p id=\"output\"></p>",
    "</body></html>"
);

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn page_call(func: &str, args: &[Value], snapshot: &str) -> String {
    json!({
        "type": "page",
        "func": func,
        "args": args,
        "selector-to-element": true,
        "url": "/",
        "html": snapshot,
        "uid": null,
    })
    .to_string()
}

fn add_values(context: &mut CallContext<'_>, args: CallArgs) -> anyhow::Result<()> {
    let first = args.element(0).context("first operand is not an element")?;
    let second = args.element(1).context("second operand is not an element")?;
    let page = context.page();
    let mut sum = 0.0_f64;
    for node in [first, second] {
        let value = page
            .element(node)
            .and_then(|input| input.value())
            .context("operand has no value")?;
        sum += value.trim().parse::<f64>()?;
    }
    page.get_element_mut("output")
        .context("no #output")?
        .set_text(&format!("{sum:.1}"))?;
    Ok(())
}

fn calculator_app() -> App {
    let mut page = match Page::from_markup(CALCULATOR, "/") {
        Ok(page) => page,
        Err(err) => panic!("template did not parse: {err}"),
    };
    if let Err(err) = page.add_function(Callable::new("addValues", add_values)) {
        panic!("stub was not attached: {err}");
    }
    let mut app = App::new(AppConfig::default());
    app.add_page(page);
    app
}

#[test]
fn add_values_sends_a_single_content_update() {
    init();
    let app = calculator_app();
    let mut session = Session::new(app.config());
    let raw = page_call(
        "addValues",
        &[element_ref("#a"), element_ref("#b")],
        CALCULATOR,
    );

    let instructions = handle_message(&app, &mut session, &raw);
    assert_eq!(instructions.len(), 1);
    let update = &instructions[0];
    assert_eq!(update.func, ops::SET_CONTENT);
    assert_eq!(update.selector(), Some("#output"));
    assert_eq!(update.kwarg("content").and_then(Value::as_str), Some("5.0"));
    assert_eq!(update.msg_num(), Some(1));
}

#[test]
fn missing_element_argument_aborts_before_invocation() {
    init();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&calls);
    let mut app = calculator_app();
    app.add_function(Callable::new("touch", move |_context, _args| {
        counter.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }));
    let mut session = Session::new(app.config());
    let raw = page_call("touch", &[element_ref("#missing")], CALCULATOR);

    let Err(err) = dispatch(&app, &mut session, &raw) else {
        panic!("a missing element must not dispatch");
    };
    assert!(matches!(&err, DispatchError::ElementNotFound(selector) if selector == "#missing"));
    assert_eq!(err.rejection(), Rejection::UnresolvedRef);
    assert!(handle_message(&app, &mut session, &raw).is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(session.msg_num(), 0);
}

#[test]
fn unknown_function_yields_no_instructions() {
    init();
    let app = calculator_app();
    let mut session = Session::new(app.config());
    let raw = page_call("nothingHere", &[], CALCULATOR);

    let Err(err) = dispatch(&app, &mut session, &raw) else {
        panic!("an unregistered function must not dispatch");
    };
    assert!(matches!(err, DispatchError::UnknownFunction(name) if name == "nothingHere"));
    assert!(handle_message(&app, &mut session, &raw).is_empty());
}

#[test]
fn malformed_messages_are_dropped() {
    init();
    let app = calculator_app();
    let mut session = Session::new(app.config());
    for raw in ["not json", "{\"func\":\"addValues\"}", "{\"type\":\"nope\"}"] {
        let Err(err) = dispatch(&app, &mut session, raw) else {
            panic!("`{raw}` must be rejected");
        };
        assert!(matches!(err, DispatchError::Protocol(_)));
        assert_eq!(err.rejection(), Rejection::BadFormat);
        assert!(handle_message(&app, &mut session, raw).is_empty());
    }
}

#[test]
fn queue_follows_mutation_order() {
    init();
    let mut app = calculator_app();
    app.add_function(Callable::new("shuffle", |context, _args| {
        let page = context.page();
        let mut output = page.get_element_mut("output").context("no #output")?;
        output.set_attribute("Title", "result")?;
        output.set_content("<b>bold</b>")?;
        output.add_content("!")?;
        output.remove_attribute("title")?;
        page.set_key("theme", "dark")?;
        page.navigate("/next", false)?;
        Ok(())
    }));
    let mut session = Session::new(app.config());
    let Ok(Outcome::Called {
        instructions,
        failure,
        ..
    }) = dispatch(&app, &mut session, &page_call("shuffle", &[], CALCULATOR))
    else {
        panic!("shuffle did not run");
    };
    assert_eq!(failure, None);
    let funcs: Vec<&str> = instructions.iter().map(|ins| ins.func.as_str()).collect();
    assert_eq!(
        funcs,
        [
            ops::SET_ATTR,
            ops::SET_CONTENT,
            ops::ADD_CONTENT,
            ops::DEL_ATTR,
            ops::SET_KEY,
            ops::GO_TO
        ]
    );
    assert_eq!(
        instructions[0].kwarg("name").and_then(Value::as_str),
        Some("title")
    );
    let numbers: Vec<Option<u64>> = instructions.iter().map(|ins| ins.msg_num()).collect();
    assert_eq!(
        numbers,
        [Some(1), Some(2), Some(3), Some(4), Some(5), Some(6)]
    );
}

#[test]
fn template_mutations_are_silent() {
    init();
    let mut page = match Page::from_markup("<p id=\"note\">hi</p>", "/about") {
        Ok(page) => page,
        Err(err) => panic!("template did not parse: {err}"),
    };
    assert!(page.html_element().is_some());
    let Some(mut note) = page.get_element_mut("note") else {
        panic!("#note is missing");
    };
    if let Err(err) = note.set_text("changed") {
        panic!("template edit failed: {err}");
    }
    assert_eq!(
        page.get_element("note").map(|found| found.text()),
        Some(String::from("changed"))
    );

    let Ok(working) = page.working_copy("", None) else {
        panic!("empty snapshot must fall back to the template");
    };
    assert!(working.queue().is_empty());
    assert_eq!(
        working.get_element("note").map(|found| found.text()),
        Some(String::from("changed"))
    );
}

#[test]
fn failing_functions_keep_their_earlier_instructions() {
    init();
    let mut app = calculator_app();
    app.add_function(Callable::new("halfway", |context, _args| {
        context
            .page()
            .get_element_mut("output")
            .context("no #output")?
            .set_text("partial")?;
        anyhow::bail!("stopped early")
    }));
    app.add_function(Callable::new("explode", |context, _args| {
        context.page().set_key("before", "panic")?;
        panic!("boom");
    }));
    let mut session = Session::new(app.config());

    let Ok(Outcome::Called {
        instructions,
        failure,
        ..
    }) = dispatch(&app, &mut session, &page_call("halfway", &[], CALCULATOR))
    else {
        panic!("halfway did not run");
    };
    assert_eq!(instructions.len(), 1);
    assert_eq!(failure.as_deref(), Some("stopped early"));

    let instructions = handle_message(&app, &mut session, &page_call("explode", &[], CALCULATOR));
    assert_eq!(instructions.len(), 1);
    assert_eq!(instructions[0].func, ops::SET_KEY);
    assert_eq!(instructions[0].msg_num(), Some(2));
}

#[test]
fn bound_arguments_surround_runtime_ones_and_count_toward_arity() {
    init();
    let mut app = calculator_app();
    app.add_function(
        Callable::new("greet", |context, args| {
            let greeting = format!(
                "{} {}{}",
                args.str(0).context("no greeting")?,
                args.str(1).context("no name")?,
                args.str(2).context("no punctuation")?
            );
            context
                .page()
                .get_element_mut("output")
                .context("no #output")?
                .set_text(&greeting)?;
            Ok(())
        })
        .bind_leading([json!("Hello")])
        .bind_trailing([json!("!")])
        .with_arity(3),
    );
    let mut session = Session::new(app.config());

    let instructions = handle_message(&app, &mut session, &page_call("greet", &[json!("Ada")], CALCULATOR));
    assert_eq!(instructions.len(), 1);
    assert_eq!(
        instructions[0].kwarg("content").and_then(Value::as_str),
        Some("Hello Ada!")
    );

    let raw = page_call("greet", &[json!("Ada"), json!("Lovelace")], CALCULATOR);
    let Err(DispatchError::ArityMismatch {
        function,
        expected,
        found,
    }) = dispatch(&app, &mut session, &raw)
    else {
        panic!("extra arguments must be refused");
    };
    assert_eq!((function.as_str(), expected, found), ("greet", 3, 4));
}

#[test]
fn element_references_stay_values_without_the_flag() {
    init();
    let mut app = calculator_app();
    app.add_function(Callable::new("inspect", |context, args| {
        let kind = if args.element(0).is_some() {
            "element"
        } else {
            "value"
        };
        context.page().set_key("kind", kind)?;
        Ok(())
    }));
    let mut session = Session::new(app.config());
    let raw = json!({
        "type": "page",
        "func": "inspect",
        "args": [element_ref("#missing")],
        "html": CALCULATOR,
    })
    .to_string();

    let instructions = handle_message(&app, &mut session, &raw);
    assert_eq!(instructions.len(), 1);
    assert_eq!(
        instructions[0].kwarg("value").and_then(Value::as_str),
        Some("value")
    );
}

#[test]
fn pages_are_routed_by_url_then_window_then_root() {
    init();
    let mut app = App::new(AppConfig::default());
    for url in ["/", "/settings", "/about"] {
        let Ok(page) = Page::new(url) else {
            panic!("blank page failed to build");
        };
        app.add_page(page);
    }
    app.bind_window("window-1", "/about");

    let url_of = |url: Option<&str>, uid: Option<&str>| {
        app.route(url, uid).map(|page| page.url().to_owned())
    };
    assert_eq!(url_of(Some("/settings"), None).as_deref(), Some("/settings"));
    assert_eq!(
        url_of(Some("http://127.0.0.1:8080/settings?tab=2"), None).as_deref(),
        Some("/settings")
    );
    assert_eq!(url_of(None, Some("window-1")).as_deref(), Some("/about"));
    assert_eq!(url_of(Some("/elsewhere"), None).as_deref(), Some("/"));

    let empty = App::new(AppConfig::default());
    let mut session = Session::new(empty.config());
    let Err(err) = dispatch(&empty, &mut session, &page_call("any", &[], "")) else {
        panic!("an app without pages cannot dispatch");
    };
    assert!(matches!(err, DispatchError::UnknownPage(_)));
}

#[test]
fn page_functions_shadow_app_functions() {
    init();
    let mut page = match Page::from_markup(CALCULATOR, "/") {
        Ok(page) => page,
        Err(err) => panic!("template did not parse: {err}"),
    };
    let added = page.add_function(Callable::new("which", |context, _args| {
        context.page().set_key("which", "page")?;
        Ok(())
    }));
    assert!(added.is_ok());
    assert!(page.to_markup().contains("function which(...args)"));

    let mut app = App::new(AppConfig::default());
    app.add_page(page);
    app.add_function(Callable::new("which", |context, _args| {
        context.page().set_key("which", "app")?;
        Ok(())
    }));
    let mut session = Session::new(app.config());
    let instructions = handle_message(&app, &mut session, &page_call("which", &[], CALCULATOR));
    assert_eq!(
        instructions[0].kwarg("value").and_then(Value::as_str),
        Some("page")
    );
}

#[test]
fn validation_hook_refuses_messages() {
    init();
    let mut app = calculator_app();
    app.set_data_validation(|raw| !raw.contains("forbidden"));
    let mut session = Session::new(app.config());

    let raw = page_call("addValues", &[json!("forbidden")], CALCULATOR);
    let Err(err) = dispatch(&app, &mut session, &raw) else {
        panic!("the hook must refuse the message");
    };
    assert!(matches!(err, DispatchError::Rejected));

    let raw = page_call(
        "addValues",
        &[element_ref("#a"), element_ref("#b")],
        CALCULATOR,
    );
    assert_eq!(handle_message(&app, &mut session, &raw).len(), 1);
}

#[test]
fn client_calls_pass_elements_by_reference() {
    init();
    let mut app = calculator_app();
    app.add_function(Callable::new("highlight", |context, args| {
        let node = args.element(0).context("not an element")?;
        context
            .page()
            .call_client("flash", vec![node.into(), "yellow".into()])?;
        Ok(())
    }));
    let mut session = Session::new(app.config());
    let instructions = handle_message(
        &app,
        &mut session,
        &page_call("highlight", &[element_ref("#b")], CALCULATOR),
    );
    assert_eq!(instructions.len(), 1);
    assert_eq!(instructions[0].func, "flash");
    assert_eq!(instructions[0].args, [element_ref("#b"), json!("yellow")]);
}

#[test]
fn replacing_all_matches_pairs_them_in_order() {
    init();
    let snapshot = "<html><body><ul><li>a</li><li>b</li><li>c</li></ul></body></html>";
    let mut app = calculator_app();
    app.add_function(Callable::new("relabel", |context, _args| {
        let first = Element::new("li").with_text("x")?;
        let second = Element::new("li").with_text("y")?;
        context.page().replace_all("li", &[first, second])?;
        Ok(())
    }));
    let mut session = Session::new(app.config());
    let Ok(Outcome::Called { instructions, .. }) =
        dispatch(&app, &mut session, &page_call("relabel", &[], snapshot))
    else {
        panic!("relabel did not run");
    };
    assert_eq!(instructions.len(), 1);
    assert_eq!(instructions[0].func, ops::REPLACE_ELEMENTS);
    assert_eq!(
        instructions[0].kwarg("elements"),
        Some(&json!(["<li>x</li>", "<li>y</li>"]))
    );
}

#[test]
fn configuration_defaults_and_timed_cycles() {
    init();
    let defaults = AppConfig::default();
    assert_eq!(defaults.chunk_size, 16_000);
    assert_eq!(defaults.pending_ttl().as_millis(), 60_000);
    assert_eq!(defaults.transfer_ttl().as_millis(), 300_000);
    assert!(AppConfig::from_env().chunk_size >= 1);

    let mut page = match Page::from_markup(CALCULATOR, "/") {
        Ok(page) => page,
        Err(err) => panic!("template did not parse: {err}"),
    };
    if let Err(err) = page.add_function(Callable::new("addValues", add_values)) {
        panic!("stub was not attached: {err}");
    }
    let mut app = App::new(AppConfig {
        log_timings: true,
        ..AppConfig::default()
    });
    app.add_page(page);
    let mut session = Session::new(app.config());
    let raw = page_call(
        "addValues",
        &[element_ref("#a"), element_ref("#b")],
        CALCULATOR,
    );
    assert_eq!(handle_message(&app, &mut session, &raw).len(), 1);
    assert_eq!(session.msg_num(), 1);
}

#[test]
fn compound_helpers_emit_one_instruction_each() {
    init();
    let snapshot = concat!(
        "<html><body><div><span>a</span><span>b</span></div>",
        "<input type=\"file\" id=\"picker\"></body></html>"
    );
    let mut app = calculator_app();
    app.add_function(Callable::new("decorate", |context, _args| {
        let page = context.page();
        let span = page.select("div > span:nth-of-type(2)")?.node();
        let mut handle = page.element_mut(span);
        let id = handle.ensure_id()?;
        handle.set_width("50%")?;
        handle.onclick("printValue", &["10"], ArgumentStyle::QUOTED)?;
        handle.set_value("x")?;
        page.get_element_mut("picker")
            .context("no #picker")?
            .request_files(true)?;
        let replacement = Element::new("em").with_text("swapped")?;
        page.get_element_mut(&id)
            .context("generated id does not resolve")?
            .replace_with(&replacement)?;
        page.set_document("<html><body>fresh</body></html>")?;
        Ok(())
    }));
    let mut session = Session::new(app.config());
    let Ok(Outcome::Called {
        instructions,
        failure,
        ..
    }) = dispatch(&app, &mut session, &page_call("decorate", &[], snapshot))
    else {
        panic!("decorate did not run");
    };
    assert_eq!(failure, None);
    let funcs: Vec<&str> = instructions.iter().map(|ins| ins.func.as_str()).collect();
    assert_eq!(
        funcs,
        [
            ops::SET_ATTR,
            ops::SET_ATTR,
            ops::SET_ATTR,
            ops::SET_ATTR,
            ops::GET_FILES,
            ops::REPLACE_ELEMENT,
            ops::SET_DOC
        ]
    );
    assert_eq!(
        instructions[0].selector(),
        Some("html:root > body > div > span:nth-of-type(2)")
    );
    assert_eq!(
        instructions[1].kwarg("value").and_then(Value::as_str),
        Some("width: 50%;")
    );
    assert_eq!(
        instructions[2].kwarg("value").and_then(Value::as_str),
        Some("printValue(\"10\")")
    );
    assert_eq!(
        instructions[4].kwarg("with_content"),
        Some(&Value::Bool(true))
    );
    assert_eq!(
        instructions[5].kwarg("element").and_then(Value::as_str),
        Some("<em>swapped</em>")
    );
}

#[test]
fn user_variables_persist_per_session() {
    init();
    let mut app = calculator_app();
    app.set_default_var("visits", json!(0));
    app.set_default_var("theme", json!("light"));
    app.add_function(Callable::new("visit", |context, _args| {
        let visits = context
            .user_vars()
            .get("visits")
            .and_then(Value::as_u64)
            .context("visits was not seeded")?
            + 1;
        context.user_vars_mut().insert(String::from("visits"), json!(visits));
        context.page().set_key("visits", &visits.to_string())?;
        Ok(())
    }));

    let mut first = Session::new(app.config());
    for expected in ["1", "2"] {
        let instructions = handle_message(&app, &mut first, &page_call("visit", &[], CALCULATOR));
        assert_eq!(
            instructions[0].kwarg("value").and_then(Value::as_str),
            Some(expected)
        );
    }
    assert_eq!(first.user_vars().get("visits"), Some(&json!(2)));
    assert_eq!(first.user_vars().get("theme"), Some(&json!("light")));

    let mut second = app.new_session();
    assert_eq!(second.user_vars().get("visits"), Some(&json!(0)));
    let instructions = handle_message(&app, &mut second, &page_call("visit", &[], CALCULATOR));
    assert_eq!(
        instructions[0].kwarg("value").and_then(Value::as_str),
        Some("1")
    );
    assert_eq!(app.default_vars().get("visits"), Some(&json!(0)));
}
