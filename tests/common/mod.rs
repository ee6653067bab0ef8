#![allow(dead_code)]

use std::{
    cell::{Cell, RefCell},
    collections::BTreeMap,
    fs,
    os::fd::BorrowedFd,
    path::{Path, PathBuf},
    time::Duration,
};

use gpio_sysfs::{
    uapi::{RetryPolicy, Sysfs},
    ErrorKind, Interest, Reactor, ReadyHandler, Result, Token,
};
use tempfile::TempDir;

/// A `/sys/class/gpio` lookalike in a temporary directory.
///
/// Lines added with [`FakeSysfs::add_line`] look already exported, so opening them
/// never writes to `export`, but releasing them still writes to `unexport`.
pub struct FakeSysfs {
    dir: TempDir,
}

impl FakeSysfs {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("export"), "").unwrap();
        fs::write(dir.path().join("unexport"), "").unwrap();
        Self { dir }
    }

    pub fn with_lines(lines: &[u32]) -> Self {
        let this = Self::new();
        for &line in lines {
            this.add_line(line);
        }
        this
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn sysfs(&self) -> Sysfs {
        Sysfs::new(self.root()).with_retry(RetryPolicy {
            attempts: 2,
            backoff: Duration::from_millis(1),
        })
    }

    pub fn add_line(&self, line: u32) {
        let dir = self.line_dir(line);
        fs::create_dir_all(&dir).unwrap();
        for (name, content) in [
            ("direction", "in\n"),
            ("value", "0\n"),
            ("edge", "none\n"),
            ("active_low", "0\n"),
        ] {
            fs::write(dir.join(name), content).unwrap();
        }
    }

    pub fn line_dir(&self, line: u32) -> PathBuf {
        self.root().join(format!("gpio{line}"))
    }

    pub fn attribute(&self, line: u32, name: &str) -> String {
        fs::read_to_string(self.line_dir(line).join(name))
            .unwrap()
            .trim_end()
            .to_owned()
    }

    pub fn set_attribute(&self, line: u32, name: &str, content: &str) {
        fs::write(self.line_dir(line).join(name), content).unwrap();
    }

    /// Build `gpioN/` off to the side and move it into place in one step, the way it
    /// appears to a reader after a slow kernel export.
    pub fn populate_later(&self, line: u32, delay: Duration) -> std::thread::JoinHandle<()> {
        let staging = self.root().join(format!(".gpio{line}"));
        let target = self.line_dir(line);
        std::thread::spawn(move || {
            fs::create_dir(&staging).unwrap();
            for (name, content) in [
                ("direction", "in\n"),
                ("value", "0\n"),
                ("edge", "none\n"),
                ("active_low", "0\n"),
            ] {
                fs::write(staging.join(name), content).unwrap();
            }
            std::thread::sleep(delay);
            fs::rename(&staging, &target).unwrap();
        })
    }

    /// Simulate the line being driven externally.
    pub fn drive(&self, line: u32, high: bool) {
        let content = if high { "1\n" } else { "0\n" };
        fs::write(self.line_dir(line).join("value"), content).unwrap();
    }

    pub fn exported(&self) -> String {
        fs::read_to_string(self.root().join("export")).unwrap()
    }

    pub fn unexported(&self) -> String {
        fs::read_to_string(self.root().join("unexport")).unwrap()
    }

    pub fn clear_unexported(&self) {
        fs::write(self.root().join("unexport"), "").unwrap();
    }
}

struct Registration {
    interest: Interest,
    handler: Option<ReadyHandler>,
}

/// An event loop driven entirely by the test: readiness is raised with
/// [`ManualReactor::signal`] and handed out with [`ManualReactor::run_pending`].
#[derive(Default)]
pub struct ManualReactor {
    registrations: RefCell<BTreeMap<Token, Registration>>,
    pending: RefCell<Vec<Token>>,
    next_token: Cell<u64>,
    rearms: Cell<usize>,
    fail_register: Cell<bool>,
}

impl ManualReactor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.registrations.borrow().len()
    }

    pub fn tokens(&self) -> Vec<Token> {
        self.registrations.borrow().keys().copied().collect()
    }

    pub fn interest(&self, token: Token) -> Option<Interest> {
        self.registrations.borrow().get(&token).map(|r| r.interest)
    }

    pub fn rearms(&self) -> usize {
        self.rearms.get()
    }

    pub fn fail_next_register(&self) {
        self.fail_register.set(true);
    }

    /// Queue a readiness event for `token`.
    pub fn signal(&self, token: Token) {
        self.pending.borrow_mut().push(token);
    }

    /// Dispatch queued readiness, skipping tokens deregistered in the meantime.
    /// Returns the number of handlers called.
    pub fn run_pending(&self) -> usize {
        let pending: Vec<Token> = self.pending.borrow_mut().drain(..).collect();
        let mut called = 0;
        for token in pending {
            let handler = match self.registrations.borrow_mut().get_mut(&token) {
                Some(reg) => reg.handler.take(),
                None => continue,
            };
            let Some(mut handler) = handler else {
                continue;
            };
            handler();
            called += 1;
            if let Some(reg) = self.registrations.borrow_mut().get_mut(&token) {
                reg.handler.get_or_insert(handler);
            }
        }
        called
    }

    /// Signal `token` and dispatch immediately.
    pub fn fire(&self, token: Token) -> usize {
        self.signal(token);
        self.run_pending()
    }
}

impl Reactor for ManualReactor {
    fn register(&self, _fd: BorrowedFd<'_>, interest: Interest) -> Result<Token> {
        if self.fail_register.replace(false) {
            return Err(nix::Error::EMFILE.into());
        }
        let token = Token(self.next_token.get());
        self.next_token.set(token.0 + 1);
        self.registrations.borrow_mut().insert(
            token,
            Registration {
                interest,
                handler: None,
            },
        );
        Ok(token)
    }

    fn on_ready(&self, token: Token, handler: ReadyHandler) -> Result<()> {
        match self.registrations.borrow_mut().get_mut(&token) {
            Some(reg) => {
                reg.handler = Some(handler);
                Ok(())
            }
            None => Err(ErrorKind::UnknownToken(token.0).into()),
        }
    }

    fn rearm(&self, _token: Token) -> Result<()> {
        self.rearms.set(self.rearms.get() + 1);
        Ok(())
    }

    fn deregister(&self, token: Token) -> Result<()> {
        self.registrations
            .borrow_mut()
            .remove(&token)
            .map(|_| ())
            .ok_or_else(|| ErrorKind::UnknownToken(token.0).into())
    }
}
