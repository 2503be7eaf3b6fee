use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use log::{debug, error, warn};
use notify::event::{AccessKind, AccessMode, RemoveKind};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};

use crate::layout::{Layout, CHECKER_EXTENSION, MISSION_EXTENSION};
use crate::store::Store;

/// How long to keep collecting events of one burst before reloading.
const SETTLE: Duration = Duration::from_millis(100);

enum Message {
    Event(notify::Result<Event>),
    Stop,
}

/// Which collections an event (or a burst of events) invalidates.
#[derive(Debug, Default, PartialEq)]
struct Reloads {
    students: bool,
    missions: bool,
    checkers: bool,
}

impl Reloads {
    fn add(&mut self, event: &Event, layout: &Layout) {
        match event.kind {
            // A modify or close follows once the new file is written.
            EventKind::Create(_) => return,
            EventKind::Remove(RemoveKind::Folder) => return,
            EventKind::Access(AccessKind::Close(AccessMode::Write)) => {}
            EventKind::Access(_) => return,
            _ => {}
        }
        for path in &event.paths {
            self.add_path(path, layout);
        }
    }

    fn add_path(&mut self, path: &Path, layout: &Layout) {
        if path.is_dir() {
            return;
        }
        if path.file_name().is_some() && path.file_name() == layout.students_path.file_name() {
            self.students = true;
        } else if path.extension().is_some_and(|e| e == MISSION_EXTENSION) {
            self.missions = true;
        } else if path.extension().is_some_and(|e| e == CHECKER_EXTENSION) {
            self.checkers = true;
        }
    }

    fn apply(&self, store: &Store) {
        if self.students {
            store.reload_students();
        }
        if self.missions {
            store.reload_missions();
        }
        if self.checkers {
            store.reload_checkers();
        }
    }
}

/// Keeps the store in sync with the data directory until dropped.
pub struct Watcher {
    watcher: Option<RecommendedWatcher>,
    sender: Sender<Message>,
    worker: Option<JoinHandle<()>>,
}

impl Watcher {
    pub fn start(store: Store) -> notify::Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let event_sender = sender.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = event_sender.send(Message::Event(res));
        })?;
        let db_path = store.layout().db_path.clone();
        watcher.watch(&db_path, RecursiveMode::Recursive)?;
        debug!("Monitoring {} for changes", db_path.display());

        let worker = thread::Builder::new()
            .name("store-watcher".to_string())
            .spawn(move || run(store, receiver))
            .map_err(notify::Error::io)?;
        Ok(Self {
            watcher: Some(watcher),
            sender,
            worker: Some(worker),
        })
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        drop(self.watcher.take());
        let _ = self.sender.send(Message::Stop);
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                error!("Store watcher thread panicked");
            }
        }
        debug!("Stopped monitoring for changes");
    }
}

/// Single consumer of change events. Reloads run here, one at a time.
fn run(store: Store, receiver: Receiver<Message>) {
    loop {
        let mut reloads = Reloads::default();
        match receiver.recv() {
            Ok(Message::Event(event)) => collect(&mut reloads, event, store.layout()),
            Ok(Message::Stop) | Err(_) => return,
        }
        let mut stopping = false;
        loop {
            match receiver.recv_timeout(SETTLE) {
                Ok(Message::Event(event)) => collect(&mut reloads, event, store.layout()),
                Ok(Message::Stop) | Err(RecvTimeoutError::Disconnected) => {
                    stopping = true;
                    break;
                }
                Err(RecvTimeoutError::Timeout) => break,
            }
        }
        if stopping {
            return;
        }
        debug!("Applying {:?}", reloads);
        reloads.apply(&store);
    }
}

fn collect(reloads: &mut Reloads, event: notify::Result<Event>, layout: &Layout) {
    match event {
        Ok(event) => reloads.add(&event, layout),
        Err(e) => warn!("Error monitoring data directory: {}", e),
    }
}
