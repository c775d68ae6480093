use std::path::Path;
use std::sync::mpsc::{Receiver, channel};

use cells_structures::loader::is_structure_file;
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Reports structure file changes in the levels directory. Dropping it stops watching.
pub struct LevelsWatcher {
    _watcher: RecommendedWatcher,
    rx: Receiver<()>,
}

impl LevelsWatcher {
    pub fn new(dir: &Path) -> notify::Result<Self> {
        let (tx, rx) = channel::<()>();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let Ok(event) = res else {
                return;
            };
            match event.kind {
                EventKind::Modify(_) | EventKind::Create(_) | EventKind::Remove(_) | EventKind::Any => {
                    if event.paths.iter().any(|p| is_structure_file(p)) {
                        let _ = tx.send(());
                    }
                }
                _ => {}
            }
        })?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        log::info!("watching {:?} for tier changes", dir);
        Ok(Self {
            _watcher: watcher,
            rx,
        })
    }

    /// True if anything changed since the last call; coalesces bursts of events.
    pub fn changed(&self) -> bool {
        self.rx.try_iter().count() > 0
    }
}
