//! The application: template pages, app-wide functions and routing.

use crate::config::AppConfig;
use crate::page::{Page, PageTree as _};
use crate::registry::{Callable, FunctionRegistry};
use crate::session::{Session, UserVars};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use url::Url;

/// Hook deciding whether a raw inbound message is processed at all.
pub type Validator = dyn Fn(&str) -> bool + Send + Sync;

/// Everything dispatch reads. Built at setup, then shared read-only.
#[derive(Default)]
pub struct App {
    pages: Vec<Page>,
    functions: FunctionRegistry,
    /// Desktop window uid to the url of the page it shows.
    windows: HashMap<String, String>,
    validator: Option<Arc<Validator>>,
    /// Copied into every session on its first message.
    default_vars: UserVars,
    config: AppConfig,
}

/// Path component of `url`, so `http://host/a?b` and `/a` route alike.
fn route_path(url: &str) -> String {
    let Ok(base) = Url::parse("http://localhost/") else {
        return url.to_owned();
    };
    base.join(url)
        .map_or_else(|_| url.to_owned(), |joined| joined.path().to_owned())
}

impl App {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Start every session with `name` set to `value`.
    pub fn set_default_var(&mut self, name: &str, value: Value) {
        self.default_vars.insert(name.to_owned(), value);
    }

    pub fn default_vars(&self) -> &UserVars {
        &self.default_vars
    }

    /// A fresh session already holding the default variables.
    pub fn new_session(&self) -> Session {
        let mut session = Session::new(&self.config);
        session.seed_user_vars(&self.default_vars);
        session
    }

    /// Add `page`, replacing a page already registered at the same url.
    pub fn add_page(&mut self, page: Page) {
        let path = route_path(page.url());
        if let Some(existing) = self
            .pages
            .iter_mut()
            .find(|existing| route_path(existing.url()) == path)
        {
            log::warn!("page `{path}` was already registered and has been replaced");
            *existing = page;
            return;
        }
        log::debug!("page `{path}` registered");
        self.pages.push(page);
    }

    /// Register a function callable from every page.
    ///
    /// App-wide functions get no client stub; pages call them through
    /// handlers or their own script.
    pub fn add_function(&mut self, callable: Callable) {
        self.functions.register(callable);
    }

    /// Process only messages for which `validator` returns `true`.
    pub fn set_data_validation<F>(&mut self, validator: F)
    where
        F: Fn(&str) -> bool + Send + Sync + 'static,
    {
        self.validator = Some(Arc::new(validator));
    }

    /// Route calls from the desktop window `uid` to the page at `url`.
    pub fn bind_window(&mut self, uid: &str, url: &str) {
        self.windows.insert(uid.to_owned(), route_path(url));
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    pub fn page(&self, url: &str) -> Option<&Page> {
        let path = route_path(url);
        self.pages.iter().find(|page| route_path(page.url()) == path)
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Page for a call: by url, then by window, then `/`, then the first page.
    pub fn route(&self, url: Option<&str>, uid: Option<&str>) -> Option<&Page> {
        url.and_then(|url| self.page(url))
            .or_else(|| {
                uid.and_then(|uid| self.windows.get(uid))
                    .and_then(|url| self.page(url))
            })
            .or_else(|| self.page("/"))
            .or_else(|| self.pages.first())
    }

    /// Function `name` as seen from `page`: its own registry wins.
    pub fn function<'app>(&'app self, page: &'app Page, name: &str) -> Option<&'app Callable> {
        page.functions()
            .get(name)
            .or_else(|| self.functions.get(name))
    }

    /// Whether the data-validation hook lets `raw` through.
    pub fn accepts(&self, raw: &str) -> bool {
        self.validator
            .as_ref()
            .is_none_or(|validator| validator(raw))
    }
}
