use protocol::{
    ChunkData, FileChunk, Instruction, Message, ProtocolError, Target, element_ref,
    element_ref_selector, ops, parse_message,
};
use serde_json::{Value, json};

#[test]
fn page_call_decodes_with_element_arguments() {
    let _ = env_logger::builder().is_test(true).try_init();
    let raw = r##"{"type":"page","func":"pick","args":[1,{"type":"element","selector":"#a"}],
        "selector-to-element":true,"url":"/","html":"<p id='a'></p>","uid":null}"##;
    let Message::Page(call) = parse_message(raw).unwrap() else {
        panic!("expected a page call");
    };
    assert_eq!(call.func, "pick");
    assert!(call.selector_to_element);
    assert_eq!(call.url.as_deref(), Some("/"));
    assert_eq!(call.uid, None);
    assert_eq!(call.kwargs, None);
    assert_eq!(element_ref_selector(&call.args[1]), Some("#a"));
    assert_eq!(element_ref_selector(&call.args[0]), None);
}

#[test]
fn page_call_fields_default_when_absent() {
    let Message::Page(call) = parse_message(r#"{"type":"page","func":"go"}"#).unwrap() else {
        panic!("expected a page call");
    };
    assert!(call.args.is_empty());
    assert!(!call.selector_to_element);
    assert!(call.html.is_empty());
    assert_eq!(call.msg_num, None);
}

#[test]
fn files_batch_accepts_data_alias() {
    let raw = r#"{"type":"files","data":[{"name":"a.txt","size":3,"file-type":"text/plain",
        "last-modified":1700000000000,"selector":"input#up","file-id":"0","content":"abc"}],
        "msg-num":4}"#;
    let message = parse_message(raw).unwrap();
    assert_eq!(message.msg_num(), Some(4));
    let Message::Files(batch) = message else {
        panic!("expected files");
    };
    let file = &batch.files[0];
    assert_eq!(file.name, "a.txt");
    assert_eq!(file.file_type, "text/plain");
    assert_eq!(file.last_modified, 1_700_000_000_000);
    assert_eq!(file.file_id, "0");
    assert_eq!(file.content.as_deref(), Some("abc"));
}

#[test]
fn save_chunks_carry_text_or_bytes() {
    let Message::SaveFiles(text) =
        parse_message(r#"{"type":"save files","data":"hel","end":false,"msg-num":2}"#).unwrap()
    else {
        panic!("expected a chunk");
    };
    assert_eq!(text.data, ChunkData::Text(String::from("hel")));
    assert!(!text.end);

    let Message::SaveFiles(bytes) =
        parse_message(r#"{"type":"save files","data":[0,255],"end":true,"file-id":"7"}"#).unwrap()
    else {
        panic!("expected a chunk");
    };
    assert_eq!(bytes.data, ChunkData::Bytes(vec![0, 255]));
    assert_eq!(bytes.file_id.as_deref(), Some("7"));
    assert!(bytes.end);
}

#[test]
fn outbound_chunk_is_tagged() {
    let chunk = FileChunk {
        data: ChunkData::Text(String::from("x")),
        end: true,
        msg_num: None,
        file_id: Some(String::from("1")),
    };
    let value: Value = serde_json::from_str(&chunk.to_json().unwrap()).unwrap();
    assert_eq!(
        value,
        json!({"type": "save files", "data": "x", "end": true, "file-id": "1"})
    );
}

#[test]
fn bad_messages_are_typed_errors() {
    assert!(matches!(
        parse_message("{not json"),
        Err(ProtocolError::Malformed(_))
    ));
    assert!(matches!(
        parse_message(r#"{"func":"x"}"#),
        Err(ProtocolError::MissingType)
    ));
    assert!(matches!(
        parse_message(r#"{"type":"ping"}"#),
        Err(ProtocolError::UnknownType(kind)) if kind == "ping"
    ));
    assert!(matches!(
        parse_message(r#"{"type":"page","args":[]}"#),
        Err(ProtocolError::Malformed(_))
    ));
}

#[test]
fn instructions_serialize_without_target() {
    let instruction = Instruction::set_content("#output", "5.0");
    assert_eq!(instruction.target, Target::Element);
    let value: Value = serde_json::from_str(&instruction.to_json().unwrap()).unwrap();
    assert_eq!(
        value,
        json!({"func": "_setContent", "args": [], "kwargs": {"selector": "#output", "content": "5.0"}})
    );
}

#[test]
fn instruction_constructors_use_client_names() {
    assert_eq!(Instruction::set_attribute("#a", "x", "1").func, ops::SET_ATTR);
    assert_eq!(Instruction::remove_attribute("#a", "x").func, ops::DEL_ATTR);
    assert_eq!(
        Instruction::save_file("3", true).kwarg("file-id"),
        Some(&json!("3"))
    );
    assert_eq!(Instruction::go_to("/next", false).kwarg("new"), Some(&json!(false)));
    assert_eq!(
        Instruction::replace_elements("li", vec![String::from("<li>1</li>")]).kwarg("elements"),
        Some(&json!(["<li>1</li>"]))
    );
    assert_eq!(Instruction::request_files("#f", true).selector(), Some("#f"));
    assert!(ops::is_builtin(ops::SET_DOC));
    assert!(!ops::is_builtin("refresh"));
}

#[test]
fn stamping_and_custom_calls() {
    let mut call = Instruction::custom("highlight", vec![element_ref("#a"), json!(2)]);
    assert_eq!(call.target, Target::Page);
    call.stamp(9);
    assert_eq!(call.msg_num(), Some(9));
    let value: Value = serde_json::from_str(&call.to_json().unwrap()).unwrap();
    assert_eq!(
        value,
        json!({
            "func": "highlight",
            "args": [{"type": "element", "selector": "#a"}, 2],
            "kwargs": {"msg-num": 9}
        })
    );
}
