use super::graph::{GraphData, KnowledgeGraph};
use super::store::{EdgeMerge, GraphCounts, GraphSession, GraphStore};
use crate::domain::{Entity, RelationType};
use crate::error::GraphError;
use fs2::FileExt;
use parking_lot::{Mutex, MutexGuard};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, warn};

pub struct KnowledgeGraphLoader;

impl KnowledgeGraphLoader {
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<KnowledgeGraph, GraphError> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(KnowledgeGraph::new());
        }
        let data = fs::read_to_string(path).map_err(|err| {
            GraphError::Storage(format!("impossible de lire le graphe depuis {:?}: {err}", path))
        })?;
        let graph_data: GraphData = serde_json::from_str(&data).map_err(|err| {
            GraphError::Storage(format!("JSON invalide pour le graphe {:?}: {err}", path))
        })?;
        Ok(KnowledgeGraph::from_parts(graph_data))
    }
}

pub struct KnowledgeGraphWriter;

impl KnowledgeGraphWriter {
    /// Writes a temporary sibling file, then renames it over `path`.
    pub fn save_to_path(path: impl AsRef<Path>, graph: &KnowledgeGraph) -> Result<(), GraphError> {
        let path = path.as_ref();
        let write_err = |err: std::io::Error| {
            GraphError::Storage(format!("impossible d'écrire le graphe dans {:?}: {err}", path))
        };
        let dir = ensure_parent(path)?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(write_err)?;
        serde_json::to_writer_pretty(&mut tmp, graph.snapshot())
            .map_err(|err| GraphError::Storage(err.to_string()))?;
        tmp.flush().map_err(write_err)?;
        tmp.persist(path).map_err(|err| write_err(err.error))?;
        Ok(())
    }
}

fn ensure_parent(path: &Path) -> Result<&Path, GraphError> {
    match path.parent().filter(|p| !p.as_os_str().is_empty()) {
        Some(parent) => {
            fs::create_dir_all(parent).map_err(|err| {
                GraphError::Storage(format!("impossible de créer le dossier {:?}: {err}", parent))
            })?;
            Ok(parent)
        }
        None => Ok(Path::new(".")),
    }
}

/// Exclusive advisory lock on `<graph file>.lock`, held for one session.
struct FileLock {
    file: File,
}

impl FileLock {
    fn acquire(graph_path: &Path) -> Result<Self, GraphError> {
        ensure_parent(graph_path)?;
        let mut name = graph_path.as_os_str().to_owned();
        name.push(".lock");
        let lock_path = PathBuf::from(name);
        let lock_err = |err: std::io::Error| {
            GraphError::Storage(format!("verrou {:?} impossible: {err}", lock_path))
        };

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(lock_err)?;
        FileExt::lock_exclusive(&file).map_err(lock_err)?;
        debug!(verrou = %lock_path.display(), "verrou du graphe acquis");
        Ok(Self { file })
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        if let Err(err) = FileExt::unlock(&self.file) {
            warn!(erreur = %err, "libération du verrou du graphe impossible");
        }
    }
}

/// Graph store backed by a [`KnowledgeGraph`], optionally persisted to a JSON
/// file.
///
/// With a file, each session locks it, reloads it and saves it back when the
/// session ends, so several processes can share one path.
pub struct LocalGraphStore {
    graph: Mutex<KnowledgeGraph>,
    path: Option<PathBuf>,
}

impl LocalGraphStore {
    pub fn in_memory() -> Self {
        Self {
            graph: Mutex::new(KnowledgeGraph::new()),
            path: None,
        }
    }

    pub fn open(path: impl Into<PathBuf>) -> Result<Self, GraphError> {
        let path = path.into();
        let graph = KnowledgeGraphLoader::load_from_path(&path)?;
        Ok(Self {
            graph: Mutex::new(graph),
            path: Some(path),
        })
    }

    /// Runs `f` against the graph as of the last session, for inspection.
    pub fn with_graph<R>(&self, f: impl FnOnce(&KnowledgeGraph) -> R) -> R {
        f(&*self.graph.lock())
    }
}

impl GraphStore for LocalGraphStore {
    fn session(&self) -> Result<Box<dyn GraphSession + '_>, GraphError> {
        let mut graph = self.graph.lock();
        let lock = match self.path.as_deref() {
            Some(path) => {
                let lock = FileLock::acquire(path)?;
                *graph = KnowledgeGraphLoader::load_from_path(path)?;
                Some(lock)
            }
            None => None,
        };
        Ok(Box::new(LocalSession {
            graph,
            path: self.path.as_deref(),
            dirty: false,
            _lock: lock,
        }))
    }
}

struct LocalSession<'a> {
    graph: MutexGuard<'a, KnowledgeGraph>,
    path: Option<&'a Path>,
    dirty: bool,
    // Dropped after `Drop::drop` has flushed.
    _lock: Option<FileLock>,
}

impl LocalSession<'_> {
    fn flush(&mut self) -> Result<(), GraphError> {
        if let (true, Some(path)) = (self.dirty, self.path) {
            KnowledgeGraphWriter::save_to_path(path, &self.graph)?;
        }
        self.dirty = false;
        Ok(())
    }
}

impl GraphSession for LocalSession<'_> {
    fn merge_entity(&mut self, entity: &Entity) -> Result<(), GraphError> {
        let (_, created) = self.graph.merge_entity(entity.name());
        self.dirty |= created;
        Ok(())
    }

    fn merge_relation(
        &mut self,
        source: &str,
        kind: &RelationType,
        target: &str,
    ) -> Result<EdgeMerge, GraphError> {
        let before = self.graph.counts().edges;
        let outcome = self.graph.merge_relation(source, kind, target);
        self.dirty |= self.graph.counts().edges != before;
        Ok(outcome)
    }

    fn delete_all(&mut self) -> Result<GraphCounts, GraphError> {
        let removed = self.graph.clear();
        self.dirty = true;
        Ok(removed)
    }

    fn counts(&mut self) -> Result<GraphCounts, GraphError> {
        Ok(self.graph.counts())
    }

    fn close(mut self: Box<Self>) -> Result<(), GraphError> {
        self.flush()
    }
}

impl Drop for LocalSession<'_> {
    fn drop(&mut self) {
        // Completed merges stay applied, so keep the file in step with memory.
        if let Err(err) = self.flush() {
            warn!(erreur = %err, "sauvegarde du graphe local impossible à la fermeture");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entity(name: &str) -> Entity {
        Entity::new(name).unwrap()
    }

    #[test]
    fn file_store_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("graph.json");

        let store = LocalGraphStore::open(&path).unwrap();
        let mut session = store.session().unwrap();
        session.merge_entity(&entity("甲")).unwrap();
        session.merge_entity(&entity("乙")).unwrap();
        let kind = RelationType::sanitize("认识").unwrap();
        assert_eq!(session.merge_relation("甲", &kind, "乙").unwrap(), EdgeMerge::Merged);
        session.close().unwrap();
        assert!(path.exists());

        let reopened = LocalGraphStore::open(&path).unwrap();
        reopened.with_graph(|graph| {
            assert_eq!(graph.counts(), GraphCounts { nodes: 2, edges: 1 });
            assert!(graph.get_node_by_name("甲").is_some());
        });
    }

    #[test]
    fn dropped_session_still_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        let store = LocalGraphStore::open(&path).unwrap();
        {
            let mut session = store.session().unwrap();
            session.merge_entity(&entity("a")).unwrap();
        }
        let reopened = LocalGraphStore::open(&path).unwrap();
        assert_eq!(reopened.with_graph(|g| g.counts().nodes), 1);
    }

    #[test]
    fn stores_sharing_a_file_keep_each_others_merges() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        let first = LocalGraphStore::open(&path).unwrap();
        let second = LocalGraphStore::open(&path).unwrap();

        let mut session = first.session().unwrap();
        session.merge_entity(&entity("甲")).unwrap();
        session.close().unwrap();

        let mut session = second.session().unwrap();
        session.merge_entity(&entity("乙")).unwrap();
        let kind = RelationType::sanitize("认识").unwrap();
        assert_eq!(session.merge_relation("甲", &kind, "乙").unwrap(), EdgeMerge::Merged);
        session.close().unwrap();

        let reopened = LocalGraphStore::open(&path).unwrap();
        assert_eq!(
            reopened.with_graph(|g| g.counts()),
            GraphCounts { nodes: 2, edges: 1 }
        );
    }

    #[test]
    fn concurrent_stores_on_one_file_lose_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");

        let handles: Vec<_> = (0..4)
            .map(|worker| {
                let path = path.clone();
                std::thread::spawn(move || {
                    let store = LocalGraphStore::open(&path).unwrap();
                    for i in 0..5 {
                        let mut session = store.session().unwrap();
                        session.merge_entity(&entity(&format!("w{worker}-{i}"))).unwrap();
                        session.merge_entity(&entity("commun")).unwrap();
                        session.close().unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let reopened = LocalGraphStore::open(&path).unwrap();
        assert_eq!(reopened.with_graph(|g| g.counts().nodes), 21);
    }

    #[test]
    fn save_leaves_no_temporary_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        let store = LocalGraphStore::open(&path).unwrap();
        let mut session = store.session().unwrap();
        session.merge_entity(&entity("a")).unwrap();
        session.close().unwrap();

        let mut names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        names.sort();
        assert_eq!(names, vec!["graph.json", "graph.json.lock"]);
    }

    #[test]
    fn missing_file_opens_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalGraphStore::open(dir.path().join("absent.json")).unwrap();
        let mut session = store.session().unwrap();
        assert_eq!(session.counts().unwrap(), GraphCounts::default());
    }

    #[test]
    fn corrupt_file_is_a_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        fs::write(&path, "not json").unwrap();
        assert!(matches!(
            LocalGraphStore::open(&path),
            Err(GraphError::Storage(_))
        ));
    }
}
