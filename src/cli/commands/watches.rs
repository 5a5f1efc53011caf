//! Watch list commands (watch, add-watch, unwatch, remove, list, who-watches, events).
//!
//! Each command loads the persisted registry, applies one change and saves
//! it back. A running `inwatch run` picks the change up on its next start.

use std::path::Path;

use anyhow::Context;

use crate::config::Settings;
use crate::manager::{Created, WatchManager};
use crate::storage::SnapshotStore;
use crate::watch::{Destination, EventKind};

/// The persisted registry loaded into a manager that is not listening.
pub struct Workspace {
    store: SnapshotStore,
    manager: WatchManager,
}

impl Workspace {
    pub fn open(settings: &Settings) -> anyhow::Result<Self> {
        let store = SnapshotStore::new(&settings.registry_path);
        let snapshot = store
            .load()
            .with_context(|| format!("loading {}", store.path().display()))?;
        let manager = WatchManager::from_snapshot(snapshot, &settings.listener);
        Ok(Self { store, manager })
    }

    pub fn manager(&self) -> &WatchManager {
        &self.manager
    }

    pub fn into_manager(self) -> WatchManager {
        self.manager
    }

    pub fn save(&self) -> anyhow::Result<()> {
        self.store
            .save(&self.manager.snapshot())
            .with_context(|| format!("saving {}", self.store.path().display()))
    }
}

pub fn run_watch(
    settings: &Settings,
    path: &Path,
    events: &str,
    entry_type: &str,
    dest: &str,
) -> anyhow::Result<()> {
    let workspace = Workspace::open(settings)?;
    let destination = Destination::from(dest);
    let (watch, created) =
        workspace
            .manager()
            .subscribe(path, events, entry_type, destination.clone())?;
    workspace.save()?;

    match created {
        Created::New => println!(
            "Watching {} for {} ({destination})",
            watch.path().display(),
            watch.mask_words()
        ),
        Created::Existing => println!(
            "{destination} subscribed to existing watch on {} ({})",
            watch.path().display(),
            watch.mask_words()
        ),
    }
    Ok(())
}

pub fn run_add_watch(
    settings: &Settings,
    path: &Path,
    events: &str,
    entry_type: &str,
) -> anyhow::Result<()> {
    let workspace = Workspace::open(settings)?;
    let (watch, created) = workspace.manager().create_watch(path, events, entry_type)?;

    match created {
        Created::New => {
            workspace.save()?;
            println!(
                "Added watch on {} for {}",
                watch.path().display(),
                watch.mask_words()
            );
        }
        Created::Existing => println!(
            "{} is already watched for {}",
            watch.path().display(),
            watch.mask_words()
        ),
    }
    Ok(())
}

pub fn run_unwatch(settings: &Settings, path: &Path, dest: &str) -> anyhow::Result<()> {
    let workspace = Workspace::open(settings)?;
    let destination = Destination::from(dest);
    workspace.manager().unsubscribe(path, &destination)?;
    workspace.save()?;

    println!("{destination} no longer watches {}", path.display());
    Ok(())
}

pub fn run_remove(settings: &Settings, path: &Path) -> anyhow::Result<()> {
    let workspace = Workspace::open(settings)?;
    let removed = workspace.manager().remove_watch(path)?;
    workspace.save()?;

    println!("Removed watch on {}", removed.path().display());
    Ok(())
}

pub fn run_list(settings: &Settings, dest: Option<&str>) -> anyhow::Result<()> {
    let workspace = Workspace::open(settings)?;
    let requester = dest.map(Destination::from);
    let rows = workspace.manager().list_watches(requester.as_ref());

    if rows.is_empty() {
        println!("No watches.");
        return Ok(());
    }

    println!("Watches ({}):", rows.len());
    for row in rows {
        println!("  {row}");
    }
    Ok(())
}

pub fn run_who_watches(settings: &Settings, path: &Path) -> anyhow::Result<()> {
    let workspace = Workspace::open(settings)?;
    let watchers = workspace.manager().watchers_of(path)?;

    if watchers.is_empty() {
        println!("Nobody watches {}", path.display());
    } else {
        let names: Vec<_> = watchers.iter().map(Destination::as_str).collect();
        println!("{} is watched by: {}", path.display(), names.join(", "));
    }
    Ok(())
}

pub fn run_events() {
    println!("Events:");
    for kind in EventKind::ALL {
        println!("  {kind}");
    }
    println!();
    println!("Types: 1 = all (default), 2 = files, 3 = directories");
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn settings_in(dir: &Path) -> Settings {
        Settings {
            registry_path: dir.join("watches.json"),
            ..Settings::default()
        }
    }

    #[test]
    fn test_changes_persist_between_commands() {
        let state = TempDir::new().unwrap();
        let target = TempDir::new().unwrap();
        let settings = settings_in(state.path());

        run_watch(&settings, target.path(), "create", "", "#ops").unwrap();
        run_watch(&settings, target.path(), "create", "", "alice").unwrap();

        let workspace = Workspace::open(&settings).unwrap();
        assert_eq!(
            workspace.manager().watchers_of(target.path()).unwrap(),
            vec![Destination::from("#ops"), Destination::from("alice")]
        );

        run_unwatch(&settings, target.path(), "#ops").unwrap();
        run_remove(&settings, target.path()).unwrap();

        let workspace = Workspace::open(&settings).unwrap();
        assert!(workspace.manager().list_watches(None).is_empty());
    }

    #[test]
    fn test_missing_path_not_saved() {
        let state = TempDir::new().unwrap();
        let settings = settings_in(state.path());

        let err = run_watch(&settings, Path::new("/no/such/place"), "", "", "#ops").unwrap_err();

        assert!(crate::cli::is_user_error(&err));
        assert!(!state.path().join("watches.json").exists());
    }
}
