use anyhow::Context as _;
use page_handler::{
    App, AppConfig, AssembledFile, CallArg, Callable, FileAssembler, Outcome, Page, PageTree as _,
    Session, TransferError, UploadedFile, dispatch, handle_message,
};
use protocol::{ChunkData, FileChunk, FileMetadata, element_ref, ops};
use serde_json::{Value, json};
use std::fs;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tokio::sync::oneshot::error::TryRecvError;

const UPLOAD_FORM: &str = concat!(
    "<html><body>",
    "<input type=\"file\" id=\"upload\"><input type=\"file\" id=\"other\">",
    "<p id=\"output\"></p>",
    "</body></html>"
);

type Receivers = Arc<Mutex<Vec<oneshot::Receiver<AssembledFile>>>>;

fn init() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn metadata(name: &str, selector: &str, file_id: &str) -> FileMetadata {
    FileMetadata {
        name: name.to_owned(),
        size: 5,
        file_type: String::from("text/plain"),
        last_modified: 1_700_000_000_000,
        selector: selector.to_owned(),
        file_id: file_id.to_owned(),
        content: None,
    }
}

fn files_message(msg_num: u64, files: &[(&str, &str, &str)]) -> String {
    let files: Vec<Value> = files
        .iter()
        .map(|(name, selector, file_id)| {
            json!({
                "name": name,
                "size": 5,
                "file-type": "text/plain",
                "last-modified": 0,
                "selector": selector,
                "file-id": file_id,
            })
        })
        .collect();
    json!({ "type": "files", "files": files, "msg-num": msg_num }).to_string()
}

fn save_chunk(data: Value, end: bool, msg_num: Option<u64>) -> String {
    json!({ "type": "save files", "data": data, "end": end, "msg-num": msg_num }).to_string()
}

fn upload_call(func: &str, args: &[Value]) -> String {
    json!({
        "type": "page",
        "func": func,
        "args": args,
        "selector-to-element": true,
        "url": "/",
        "html": UPLOAD_FORM,
    })
    .to_string()
}

fn text_chunk(data: &str, end: bool) -> FileChunk {
    FileChunk {
        data: ChunkData::Text(data.to_owned()),
        end,
        msg_num: None,
        file_id: Some(String::from("f1")),
    }
}

/// App whose `store` function saves every file picked in its element argument.
fn upload_app(receivers: &Receivers) -> App {
    let mut page = match Page::from_markup(UPLOAD_FORM, "/") {
        Ok(page) => page,
        Err(err) => panic!("template did not parse: {err}"),
    };
    let sink = Arc::clone(receivers);
    let added = page.add_function(Callable::new("store", move |context, args| {
        let files = args.get(0).map(CallArg::files).unwrap_or_default().to_vec();
        for file in &files {
            let receiver = context.save_file(file, false)?;
            sink.lock()
                .map_err(|err| anyhow::anyhow!("{err}"))?
                .push(receiver);
        }
        let names: Vec<&str> = files.iter().map(UploadedFile::name).collect();
        context
            .page()
            .get_element_mut("output")
            .context("no #output")?
            .set_text(&names.join(","))?;
        Ok(())
    }));
    if let Err(err) = added {
        panic!("stub was not attached: {err}");
    }
    let mut app = App::new(AppConfig::default());
    app.add_page(page);
    app
}

#[test]
fn picked_files_reach_the_element_they_were_picked_in() {
    init();
    let receivers = Receivers::default();
    let app = upload_app(&receivers);
    let mut session = Session::new(app.config());

    let raw = files_message(
        3,
        &[("notes.txt", "#upload", "f1"), ("skip.txt", "#other", "f2")],
    );
    let Ok(Outcome::FilesRegistered { count }) = dispatch(&app, &mut session, &raw) else {
        panic!("files message was not registered");
    };
    assert_eq!(count, 2);
    assert_eq!(session.pending_files(3).len(), 2);

    let instructions = handle_message(&app, &mut session, &upload_call("store", &[element_ref("#upload")]));
    let funcs: Vec<&str> = instructions.iter().map(|ins| ins.func.as_str()).collect();
    assert_eq!(funcs, [ops::SAVE_FILE, ops::SET_CONTENT]);
    assert_eq!(
        instructions[0].kwarg("file-id").and_then(Value::as_str),
        Some("f1")
    );
    assert_eq!(
        instructions[1].kwarg("content").and_then(Value::as_str),
        Some("notes.txt")
    );
    // The other input's file waits for its own call.
    assert_eq!(session.pending_file_count(), 1);
    assert_eq!(session.open_transfers(), 1);

    let save_msg = instructions[0].msg_num();
    for (data, end) in [("hel", false), ("lo", false), ("", true)] {
        let raw = save_chunk(json!(data), end, save_msg);
        let Ok(Outcome::ChunkAccepted(receipt)) = dispatch(&app, &mut session, &raw) else {
            panic!("chunk was not accepted");
        };
        assert_eq!(receipt.file_id, "f1");
        assert_eq!(receipt.complete, end);
    }
    assert_eq!(session.open_transfers(), 0);

    let Ok(mut waiting) = receivers.lock() else {
        panic!("receiver list poisoned");
    };
    let Some(mut receiver) = waiting.pop() else {
        panic!("no save was requested");
    };
    let Ok(file) = receiver.try_recv() else {
        panic!("assembled file was not delivered");
    };
    assert_eq!(file.name(), "notes.txt");
    assert_eq!(file.as_text(), Some("hello"));
}

/// App whose `keep` function saves picked files into session variables,
/// and whose `show` function prints what was kept.
fn keeping_app() -> App {
    let mut page = match Page::from_markup(UPLOAD_FORM, "/") {
        Ok(page) => page,
        Err(err) => panic!("template did not parse: {err}"),
    };
    let keep = page.add_function(Callable::new("keep", |context, args| {
        let files = args.get(0).map(CallArg::files).unwrap_or_default().to_vec();
        for file in &files {
            context.save_file_with(file, false, |saved, session| {
                let text = saved.as_text().unwrap_or_default().to_owned();
                session
                    .user_vars_mut()
                    .insert(saved.name().to_owned(), Value::String(text));
            })?;
        }
        Ok(())
    }));
    let show = page.add_function(Callable::new("show", |context, _args| {
        let kept = context
            .user_vars()
            .get("notes.txt")
            .and_then(Value::as_str)
            .unwrap_or("nothing")
            .to_owned();
        context
            .page()
            .get_element_mut("output")
            .context("no #output")?
            .set_text(&kept)?;
        Ok(())
    }));
    if let Err(err) = keep.and(show) {
        panic!("stub was not attached: {err}");
    }
    let mut app = App::new(AppConfig::default());
    app.add_page(page);
    app
}

#[test]
fn completion_handlers_run_when_the_last_chunk_arrives() {
    init();
    let app = keeping_app();
    let mut session = Session::new(app.config());
    let raw = files_message(1, &[("notes.txt", "#upload", "f1")]);
    assert!(dispatch(&app, &mut session, &raw).is_ok());

    let instructions = handle_message(&app, &mut session, &upload_call("keep", &[element_ref("#upload")]));
    assert_eq!(instructions.len(), 1);
    assert_eq!(instructions[0].func, ops::SAVE_FILE);
    let save_msg = instructions[0].msg_num();

    let before = handle_message(&app, &mut session, &upload_call("show", &[]));
    assert_eq!(
        before[0].kwarg("content").and_then(Value::as_str),
        Some("nothing")
    );

    for (data, end) in [("hel", false), ("lo", true)] {
        let raw = save_chunk(json!(data), end, save_msg);
        assert!(matches!(
            dispatch(&app, &mut session, &raw),
            Ok(Outcome::ChunkAccepted(_))
        ));
    }
    assert_eq!(session.open_transfers(), 0);

    let after = handle_message(&app, &mut session, &upload_call("show", &[]));
    assert_eq!(
        after[0].kwarg("content").and_then(Value::as_str),
        Some("hello")
    );
}

#[test]
fn idle_save_transfers_expire() {
    init();
    let config = AppConfig {
        transfer_ttl_ms: 1_000,
        ..AppConfig::default()
    };
    let mut session = Session::new(&config);
    let first = UploadedFile::new(metadata("a.txt", "#upload", "f1"), Some(1));
    let second = UploadedFile::new(metadata("b.txt", "#upload", "f2"), Some(1));
    let (Ok(mut first_rx), Ok(mut second_rx)) =
        (session.request_save(&first), session.request_save(&second))
    else {
        panic!("transfers did not open");
    };
    assert!(session.receive_chunk(text_chunk("par", false)).is_ok());

    assert_eq!(session.discard_stale(Instant::now()), 0);
    assert_eq!(session.open_transfers(), 2);

    let later = Instant::now() + Duration::from_secs(2);
    assert_eq!(session.discard_stale(later), 2);
    assert_eq!(session.open_transfers(), 0);
    assert!(matches!(first_rx.try_recv(), Err(TryRecvError::Closed)));
    assert!(matches!(second_rx.try_recv(), Err(TryRecvError::Closed)));
    assert!(matches!(
        session.receive_chunk(text_chunk("tial", true)),
        Err(TransferError::UnknownTransfer(_))
    ));
}

#[test]
fn functions_accepting_files_take_the_rest() {
    init();
    let mut app = upload_app(&Receivers::default());
    app.add_function(
        Callable::new("count", |context, args| {
            let total = args.files().len();
            context.page().set_key("count", &total.to_string())?;
            Ok(())
        })
        .accepting_files(),
    );
    let mut session = Session::new(app.config());
    let raw = files_message(
        1,
        &[("a.txt", "#upload", "f1"), ("b.txt", "#other", "f2")],
    );
    assert!(dispatch(&app, &mut session, &raw).is_ok());

    let instructions = handle_message(&app, &mut session, &upload_call("count", &[]));
    assert_eq!(
        instructions[0].kwarg("value").and_then(Value::as_str),
        Some("2")
    );
    assert_eq!(session.pending_file_count(), 0);
}

#[test]
fn pending_files_are_bounded_and_expire() {
    init();
    let config = AppConfig {
        max_pending_files: 2,
        pending_ttl_ms: 1_000,
        ..AppConfig::default()
    };
    let app = App::new(config.clone());
    let mut session = Session::new(&config);

    let two = files_message(
        1,
        &[("a.txt", "#upload", "f1"), ("b.txt", "#upload", "f2")],
    );
    assert!(dispatch(&app, &mut session, &two).is_ok());
    let one_more = files_message(2, &[("c.txt", "#upload", "f3")]);
    assert!(dispatch(&app, &mut session, &one_more).is_err());
    assert_eq!(session.pending_file_count(), 2);

    assert_eq!(session.discard_stale(Instant::now()), 0);
    let later = Instant::now() + Duration::from_secs(2);
    assert_eq!(session.discard_stale(later), 2);
    assert_eq!(session.pending_file_count(), 0);
}

#[test]
fn split_and_single_chunk_transfers_assemble_alike() {
    init();
    let config = AppConfig::default();
    let file = UploadedFile::new(metadata("notes.txt", "#upload", "f1"), Some(1));

    let mut split = Session::new(&config);
    let Ok(mut split_rx) = split.request_save(&file) else {
        panic!("transfer did not open");
    };
    for (data, end) in [("hel", false), ("lo", false), ("", true)] {
        assert!(split.receive_chunk(text_chunk(data, end)).is_ok());
    }

    let mut whole = Session::new(&config);
    let Ok(mut whole_rx) = whole.request_save(&file) else {
        panic!("transfer did not open");
    };
    assert!(whole.receive_chunk(text_chunk("hello", true)).is_ok());

    let (Ok(from_split), Ok(from_whole)) = (split_rx.try_recv(), whole_rx.try_recv()) else {
        panic!("both transfers should have completed");
    };
    assert_eq!(from_split, from_whole);
    assert_eq!(from_split.bytes(), b"hello");
}

#[test]
fn binary_chunks_mark_the_file_binary() {
    init();
    let mut session = Session::new(&AppConfig::default());
    let file = UploadedFile::new(metadata("pixel.png", "#upload", "img"), None);
    let Ok(mut receiver) = session.request_save(&file) else {
        panic!("transfer did not open");
    };
    let chunk = FileChunk {
        data: ChunkData::Bytes(vec![0x89, 0x50, 0x4e, 0x47]),
        end: true,
        msg_num: None,
        file_id: None,
    };
    let Ok(receipt) = session.receive_chunk(chunk) else {
        panic!("the only open transfer should take the chunk");
    };
    assert_eq!(receipt.file_id, "img");
    let Ok(saved) = receiver.try_recv() else {
        panic!("file was not delivered");
    };
    assert!(saved.is_binary());
    assert_eq!(saved.as_text(), None);
    assert_eq!(saved.len(), 4);
}

#[test]
fn transfers_reject_unknown_ids_and_oversized_content() {
    init();
    let mut assembler = FileAssembler::new(4);
    assert!(matches!(
        assembler.append("nope", &ChunkData::Text(String::from("x"))),
        Err(TransferError::UnknownTransfer(id)) if id == "nope"
    ));
    assert!(matches!(
        assembler.end("nope"),
        Err(TransferError::UnknownTransfer(_))
    ));

    assert!(assembler.begin("f1", metadata("a.txt", "#upload", "f1")).is_ok());
    assert!(matches!(
        assembler.begin("f1", metadata("a.txt", "#upload", "f1")),
        Err(TransferError::AlreadyOpen(_))
    ));
    assert!(matches!(
        assembler.append("f1", &ChunkData::Text(String::from("abc"))),
        Ok(3)
    ));
    assert!(matches!(
        assembler.append("f1", &ChunkData::Text(String::from("de"))),
        Err(TransferError::TooLarge { limit: 4, .. })
    ));
    assert!(!assembler.is_open("f1"));

    let mut session = Session::new(&AppConfig::default());
    assert!(matches!(
        session.receive_chunk(FileChunk {
            msg_num: Some(9),
            ..FileChunk::default()
        }),
        Err(TransferError::UnknownTransfer(_))
    ));
}

#[test]
fn outbound_chunks_end_with_an_empty_marker() {
    init();
    let file = AssembledFile::new(metadata("greeting.txt", "#upload", "f1"), "héllo", false);
    let chunks: Vec<FileChunk> = file.chunks(2).collect();
    let texts: Vec<&[u8]> = chunks.iter().map(|chunk| chunk.data.as_bytes()).collect();
    assert_eq!(texts.concat(), "héllo".as_bytes());
    assert!(chunks.iter().all(|chunk| chunk.file_id.as_deref() == Some("f1")));
    let Some((last, body)) = chunks.split_last() else {
        panic!("chunking yielded nothing");
    };
    assert!(last.end && last.data.is_empty());
    assert!(body.iter().all(|chunk| !chunk.end && chunk.data.len() <= 2));
    assert!(body
        .iter()
        .all(|chunk| matches!(&chunk.data, ChunkData::Text(text) if !text.is_empty())));

    let empty = AssembledFile::new(metadata("empty.bin", "", ""), Vec::new(), true);
    let only: Vec<FileChunk> = empty.chunks(16_000).collect();
    assert_eq!(only.len(), 1);
    assert!(only[0].end && only[0].file_id.is_none());
}

#[test]
fn assembled_files_persist_under_their_base_name() {
    init();
    let Ok(dir) = tempfile::tempdir() else {
        panic!("no temporary directory");
    };
    let file = AssembledFile::new(metadata("../escape/notes.txt", "#upload", "f1"), "hello", false);
    let Ok(path) = file.persist(dir.path()) else {
        panic!("file was not written");
    };
    assert_eq!(path, dir.path().join("notes.txt"));
    assert!(matches!(fs::read_to_string(&path).as_deref(), Ok("hello")));

    let mut written = Vec::new();
    assert!(file.write_to(&mut written).is_ok());
    assert_eq!(written, b"hello");

    let nameless = AssembledFile::new(metadata("..", "#upload", "f2"), "x", false);
    assert!(matches!(
        nameless.persist(dir.path()),
        Err(TransferError::InvalidName(_))
    ));
}
