//! Names of the replay routines understood by the client script.

pub const SET_ATTR: &str = "_setAttr";
pub const DEL_ATTR: &str = "_delAttr";
pub const SET_CONTENT: &str = "_setContent";
pub const ADD_CONTENT: &str = "_addContent";
pub const REPLACE_ELEMENT: &str = "_replaceElement";
pub const REPLACE_ELEMENTS: &str = "_replaceElements";
pub const GET_FILES: &str = "_getFiles";
pub const SAVE_FILE: &str = "_saveFile";
pub const SET_DOC: &str = "_setDoc";
pub const ADD_SCRIPT: &str = "_addScript";
pub const GO_TO: &str = "_goTo";
pub const SET_KEY: &str = "_setKey";
pub const DEL_KEY: &str = "_delKey";

/// Every built-in routine; custom client calls must avoid these names.
pub const ALL: [&str; 13] = [
    SET_ATTR,
    DEL_ATTR,
    SET_CONTENT,
    ADD_CONTENT,
    REPLACE_ELEMENT,
    REPLACE_ELEMENTS,
    GET_FILES,
    SAVE_FILE,
    SET_DOC,
    ADD_SCRIPT,
    GO_TO,
    SET_KEY,
    DEL_KEY,
];

/// True for names reserved by the client script.
pub fn is_builtin(func: &str) -> bool {
    ALL.contains(&func)
}
