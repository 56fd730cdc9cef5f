use std::io::Read;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use jj_logging::{jj_debug, jj_warn};
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InputError {
    #[error("input closed")]
    Closed,
    #[error("another prompt is waiting for input")]
    Busy,
}

#[derive(Debug, Default)]
struct Routes {
    prompt: Option<mpsc::UnboundedSender<u8>>,
    keys: Option<(u64, mpsc::UnboundedSender<u8>)>,
    next_lease: u64,
    closed: bool,
}

/// Single reader of the terminal input that routes each byte to exactly one
/// consumer: an open prompt first, otherwise the keystroke watcher.
#[derive(Debug, Clone)]
pub struct InputMux {
    routes: Arc<Mutex<Routes>>,
}

impl InputMux {
    pub fn stdin() -> Self {
        Self::from_reader(std::io::stdin())
    }

    /// Reads `reader` on a dedicated thread until EOF.
    pub fn from_reader<R: Read + Send + 'static>(reader: R) -> Self {
        let mux = Self {
            routes: Arc::new(Mutex::new(Routes::default())),
        };
        let routes = mux.routes.clone();
        let spawned = std::thread::Builder::new()
            .name("jj-input".to_string())
            .spawn(move || pump(reader, &routes));
        if let Err(err) = spawned {
            jj_warn!("input reader thread failed to start: {err}");
            mux.lock().closed = true;
        }
        mux
    }

    /// Claims keystrokes not consumed by a prompt. A newer lease replaces an
    /// older one.
    pub fn keystrokes(&self) -> KeystrokeLease {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut routes = self.lock();
        routes.next_lease += 1;
        let id = routes.next_lease;
        if !routes.closed {
            routes.keys = Some((id, tx));
        }
        KeystrokeLease {
            id,
            rx,
            routes: self.routes.clone(),
        }
    }

    /// Reads one line while holding prompt ownership. Keystroke delivery
    /// resumes when the line is complete or the future is dropped.
    pub async fn read_line(&self) -> Result<String, InputError> {
        let (tx, mut rx) = mpsc::unbounded_channel();
        {
            let mut routes = self.lock();
            if routes.closed {
                return Err(InputError::Closed);
            }
            if routes.prompt.is_some() {
                return Err(InputError::Busy);
            }
            routes.prompt = Some(tx);
        }
        let _release = PromptRelease {
            routes: self.routes.clone(),
        };

        let mut line = Vec::new();
        loop {
            match rx.recv().await {
                Some(b'\n') => break,
                Some(byte) => line.push(byte),
                None if line.is_empty() => return Err(InputError::Closed),
                None => break,
            }
        }
        let text = String::from_utf8_lossy(&line);
        Ok(text.trim_end_matches('\r').to_string())
    }

    fn lock(&self) -> MutexGuard<'_, Routes> {
        lock_routes(&self.routes)
    }
}

fn lock_routes(routes: &Mutex<Routes>) -> MutexGuard<'_, Routes> {
    routes.lock().unwrap_or_else(PoisonError::into_inner)
}

fn pump<R: Read>(mut reader: R, routes: &Mutex<Routes>) {
    let mut buf = [0u8; 256];
    loop {
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(err) => {
                jj_debug!("input read failed: {err}");
                break;
            }
        };
        let mut routes = lock_routes(routes);
        for &byte in &buf[..read] {
            route_byte(&mut routes, byte);
        }
    }
    let mut routes = lock_routes(routes);
    routes.closed = true;
    routes.prompt = None;
    routes.keys = None;
}

fn route_byte(routes: &mut Routes, byte: u8) {
    if let Some(prompt) = &routes.prompt {
        let delivered = prompt.send(byte).is_ok();
        if !delivered || byte == b'\n' {
            routes.prompt = None;
        }
        if delivered {
            return;
        }
    }
    if let Some((_, keys)) = &routes.keys {
        if keys.send(byte).is_err() {
            routes.keys = None;
        }
    }
}

struct PromptRelease {
    routes: Arc<Mutex<Routes>>,
}

impl Drop for PromptRelease {
    fn drop(&mut self) {
        lock_routes(&self.routes).prompt = None;
    }
}

/// Keystrokes routed to the bar while no prompt is open.
#[derive(Debug)]
pub struct KeystrokeLease {
    id: u64,
    rx: mpsc::UnboundedReceiver<u8>,
    routes: Arc<Mutex<Routes>>,
}

impl KeystrokeLease {
    pub async fn recv(&mut self) -> Option<u8> {
        self.rx.recv().await
    }
}

impl Drop for KeystrokeLease {
    fn drop(&mut self) {
        let mut routes = lock_routes(&self.routes);
        if routes.keys.as_ref().is_some_and(|(id, _)| *id == self.id) {
            routes.keys = None;
        }
    }
}
