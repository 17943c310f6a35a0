//! Merges collector output and terminal input into one event stream.

use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossterm::event::{self as term, KeyEvent, KeyEventKind};
use tracing::debug;

use crate::collector::Stat;
use crate::util::CancelToken;

const INPUT_POLL: Duration = Duration::from_millis(100);

/// Something the screen loop has to react to.
#[derive(Debug)]
pub enum Event {
    Stat(Box<Stat>),
    Key(KeyEvent),
    Resize(u16, u16),
    /// The collector closed its channel.
    StreamEnd,
}

/// Single queue fed by the relay and input threads.
pub struct EventHandler {
    tx: Sender<Event>,
    rx: Receiver<Event>,
}

impl Default for EventHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl EventHandler {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    /// Forwards every [`Stat`] and ends with [`Event::StreamEnd`].
    pub fn relay_stats(&self, stats: Receiver<Stat>) -> io::Result<JoinHandle<()>> {
        let tx = self.tx.clone();
        thread::Builder::new()
            .name("stat-relay".to_string())
            .spawn(move || {
                for stat in stats {
                    if tx.send(Event::Stat(Box::new(stat))).is_err() {
                        return;
                    }
                }
                let _ = tx.send(Event::StreamEnd);
            })
    }

    /// Reads the terminal until `cancel` is set or the queue is dropped.
    pub fn listen_terminal(&self, cancel: CancelToken) -> io::Result<JoinHandle<()>> {
        let tx = self.tx.clone();
        thread::Builder::new()
            .name("input".to_string())
            .spawn(move || {
                while !cancel.is_cancelled() {
                    let event = match term::poll(INPUT_POLL) {
                        Ok(true) => term::read(),
                        Ok(false) => continue,
                        Err(e) => Err(e),
                    };
                    let event = match event {
                        Ok(term::Event::Key(key)) if key.kind == KeyEventKind::Press => {
                            Event::Key(key)
                        }
                        Ok(term::Event::Resize(w, h)) => Event::Resize(w, h),
                        Ok(_) => continue,
                        Err(e) => {
                            debug!("terminal input failed: {}", e);
                            return;
                        }
                    };
                    if tx.send(event).is_err() {
                        return;
                    }
                }
            })
    }

    /// Blocks until the next event.
    pub fn next(&self) -> Option<Event> {
        self.rx.recv().ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::mock::{MockDb, MockFs};
    use crate::collector::procfs::LocalProc;
    use crate::collector::{Collector, CollectorConfig, OsSource};
    use crate::snapshot::Snapshot;
    use crate::view::View;

    fn stat() -> Stat {
        let db = MockDb::new().push(Snapshot::from_text(&["n"], &[vec!["1"]]));
        let os = OsSource::Local(Box::new(LocalProc::new(MockFs::typical_system())));
        let mut collector = Collector::new(
            db,
            os,
            View::new("main", "SELECT 1"),
            CollectorConfig::default(),
        );
        collector.update().unwrap()
    }

    #[test]
    fn relay_ends_with_stream_end() {
        let events = EventHandler::new();
        let (tx, rx) = mpsc::channel();
        let relay = events.relay_stats(rx).unwrap();

        tx.send(stat()).unwrap();
        drop(tx);

        assert!(matches!(events.next(), Some(Event::Stat(s)) if s.view == "main"));
        assert!(matches!(events.next(), Some(Event::StreamEnd)));
        relay.join().unwrap();
    }
}
