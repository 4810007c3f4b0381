/*! Generation-tagged load orchestration.
 *
 * Every load request gets a [LoadToken] carrying a fresh [Generation]. Results of a request are
 * only applied while its token is the most recently issued one; anything arriving later is
 * released or dropped. The state machine ([LoadOrchestrator]) is synchronous, the asynchronous
 * chain is driven by [Viewer::load].
 *
 * ```text
 * issued → description pending → tree built → activated → meshes pending (unordered) → settled
 * ```
 */

use crate::arena::ArenaIndex;
use crate::asset::{load_mesh, AssetSource, MeshAsset, MeshFormat};
use crate::description::Description;
use crate::errors::{AssetError, DescriptionError, LoadError};
use crate::tree::{BuildReport, ReleaseSummary, Tree, TreeBuilder};
use crate::urdf::parse_urdf_str;
use crate::ViewerConfig;
use itertools::Itertools;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use tracing_attributes::instrument;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Generation(pub u64);

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen {}", self.0)
    }
}

/// Proof of a request. Checked at every point where a result comes back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadToken {
    generation: Generation,
}

impl LoadToken {
    pub fn generation(&self) -> Generation {
        self.generation
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    /// Location of the description (`.urdf`/`.xml` for URDF, JSON otherwise)
    pub description: String,
    /// Directory the link's mesh references are relative to
    pub mesh_root: String,
    pub color: [f32; 3],
}

impl LoadRequest {
    pub fn new(description: impl Into<String>, mesh_root: impl Into<String>) -> Self {
        LoadRequest {
            description: description.into(),
            mesh_root: mesh_root.into(),
            color: [0.8, 0.8, 0.8],
        }
    }

    pub fn color(mut self, color: [f32; 3]) -> Self {
        self.color = color;
        self
    }
}

/// What happened to a freshly built tree
#[derive(Debug, Clone, PartialEq)]
pub enum Activation {
    /// It is active now. Contains what the previous tree released, if there was one.
    Activated { released: Option<ReleaseSummary> },
    /// A newer request was issued meanwhile, the tree has been released
    Discarded(ReleaseSummary),
}

#[derive(Debug, Clone, PartialEq)]
pub enum MeshOutcome {
    Attached(ArenaIndex),
    /// The request is stale, the asset was dropped
    Discarded,
    /// Fetch or parse failed; only this link stays without geometry
    Failed,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LoadStatus {
    Complete,
    /// Names of the links whose geometry could not be loaded
    Partial { failed: Vec<String> },
    /// A newer request took over
    Superseded,
}

/// History entry of a [LoadOrchestrator]
#[derive(Debug, Clone, PartialEq)]
pub enum LoadEvent {
    Activated { generation: Generation, root: String },
    Discarded { generation: Generation },
    Released { generation: Generation, summary: ReleaseSummary },
    MeshAttached { generation: Generation, link: String },
    MeshDiscarded { generation: Generation, link: usize },
    MeshFailed { generation: Generation, link: String, reason: String },
    Settled { generation: Generation, status: LoadStatus },
}

/// Outcome of [Viewer::load]
#[derive(Debug, Clone, PartialEq)]
pub struct LoadReport {
    pub generation: Generation,
    pub status: LoadStatus,
    /// Anomalies found while building. Empty if the description never got that far.
    pub build: BuildReport,
}

/// Holds the active tree and decides which results are applied
#[derive(Debug, Default)]
pub struct LoadOrchestrator {
    latest: Generation,
    active: Option<(Generation, Tree)>,
    events: Vec<LoadEvent>,
}

impl LoadOrchestrator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts a request. All earlier tokens become stale.
    pub fn issue(&mut self) -> LoadToken {
        self.latest = Generation(self.latest.0 + 1);
        debug!(generation = %self.latest, "load issued");
        LoadToken {
            generation: self.latest,
        }
    }

    pub fn is_current(&self, token: &LoadToken) -> bool {
        token.generation == self.latest
    }

    pub fn latest(&self) -> Generation {
        self.latest
    }

    pub fn active(&self) -> Option<&Tree> {
        self.active.as_ref().map(|(_, tree)| tree)
    }

    pub fn active_mut(&mut self) -> Option<&mut Tree> {
        self.active.as_mut().map(|(_, tree)| tree)
    }

    pub fn active_generation(&self) -> Option<Generation> {
        self.active.as_ref().map(|(generation, _)| *generation)
    }

    pub fn events(&self) -> &[LoadEvent] {
        &self.events
    }

    /// Activates `tree` if `token` is current and releases the tree it replaces. A stale tree
    /// is released right away.
    pub fn on_description(&mut self, token: &LoadToken, tree: Tree) -> Activation {
        let generation = token.generation;
        if !self.is_current(token) {
            let summary = tree.release();
            warn!(%generation, latest = %self.latest, "stale description discarded");
            self.events.push(LoadEvent::Discarded { generation });
            self.events.push(LoadEvent::Released { generation, summary });
            return Activation::Discarded(summary);
        }

        let root = tree.links()[tree.root_link()].name().to_string();
        info!(%generation, %root, "tree activated");
        self.events.push(LoadEvent::Activated { generation, root });
        let released = self.active.replace((generation, tree)).map(|(previous, tree)| {
            let summary = tree.release();
            self.events.push(LoadEvent::Released {
                generation: previous,
                summary,
            });
            summary
        });
        Activation::Activated { released }
    }

    /// Applies the result of one mesh load to the active tree
    pub fn on_mesh(&mut self, token: &LoadToken, link: usize, result: Result<MeshAsset, AssetError>) -> MeshOutcome {
        let generation = token.generation;
        let tree = match &mut self.active {
            Some((active, tree)) if *active == generation && generation == self.latest => tree,
            _ => {
                debug!(%generation, link, "stale mesh dropped");
                self.events.push(LoadEvent::MeshDiscarded { generation, link });
                return MeshOutcome::Discarded;
            }
        };
        let name = tree.link(link).map(|l| l.name().to_string()).unwrap_or_default();
        let attached = match result {
            Ok(asset) => tree.attach_mesh(link, asset).map_err(|e| e.to_string()),
            Err(error) => Err(error.to_string()),
        };
        match attached {
            Ok(node) => {
                self.events.push(LoadEvent::MeshAttached { generation, link: name });
                MeshOutcome::Attached(node)
            }
            Err(reason) => {
                warn!(%generation, link = %name, %reason, "mesh failed, link stays without geometry");
                self.events.push(LoadEvent::MeshFailed {
                    generation,
                    link: name,
                    reason,
                });
                MeshOutcome::Failed
            }
        }
    }

    /// Aggregates the outcome of a request once all of its meshes are in
    pub fn settle(&mut self, token: &LoadToken, failed: Vec<String>) -> LoadStatus {
        let generation = token.generation;
        let status = if !self.is_current(token) {
            LoadStatus::Superseded
        } else if failed.is_empty() {
            LoadStatus::Complete
        } else {
            LoadStatus::Partial { failed }
        };
        info!(%generation, ?status, "load settled");
        self.events.push(LoadEvent::Settled {
            generation,
            status: status.clone(),
        });
        status
    }
}

/// Drives loads against an [AssetSource] on a single cooperative tokio runtime.
///
/// Requests may overlap (e.g. two `load` futures joined); the most recently issued one wins. Mesh
/// tasks are spawned on the ambient runtime, so `load` must be awaited inside one.
pub struct Viewer<S> {
    source: Arc<S>,
    config: Arc<ViewerConfig>,
    state: RefCell<LoadOrchestrator>,
}

impl<S: AssetSource> Viewer<S> {
    pub fn new(source: S, config: ViewerConfig) -> Self {
        Viewer {
            source: Arc::new(source),
            config: Arc::new(config),
            state: RefCell::new(LoadOrchestrator::new()),
        }
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    /// Read access to the active tree
    pub fn with_active<R>(&self, f: impl FnOnce(&Tree) -> R) -> Option<R> {
        self.state.borrow().active().map(f)
    }

    /// Write access to the active tree, e.g. for setting joint angles
    pub fn with_active_mut<R>(&self, f: impl FnOnce(&mut Tree) -> R) -> Option<R> {
        self.state.borrow_mut().active_mut().map(f)
    }

    pub fn active_generation(&self) -> Option<Generation> {
        self.state.borrow().active_generation()
    }

    pub fn events(&self) -> Vec<LoadEvent> {
        self.state.borrow().events().to_vec()
    }

    fn is_current(&self, token: &LoadToken) -> bool {
        self.state.borrow().is_current(token)
    }

    fn superseded(&self, token: &LoadToken, build: BuildReport) -> LoadReport {
        let status = self.state.borrow_mut().settle(token, vec![]);
        LoadReport {
            generation: token.generation,
            status,
            build,
        }
    }

    /// Loads a description and its meshes and makes the result the active tree.
    ///
    /// Returns an error for a failed description fetch/parse, a description without root and a
    /// mesh of an unsupported format. The latter is reported after all other meshes settled,
    /// which stay attached. A request overtaken by a newer one resolves to
    /// [LoadStatus::Superseded] instead of an error.
    #[instrument(skip(self, request), fields(description = %request.description))]
    pub async fn load(&self, request: LoadRequest) -> Result<LoadReport, LoadError> {
        let token = self.state.borrow_mut().issue();

        let fetched = self.source.fetch(&request.description).await;
        let built = fetched
            .map_err(|source| LoadError::DescriptionFetch {
                location: request.description.clone(),
                source,
            })
            .and_then(|bytes| self.build(&request, &bytes));
        let (tree, build) = match built {
            Ok(built) => built,
            Err(error) if !self.is_current(&token) => {
                debug!(%error, "stale description failed, ignored");
                return Ok(self.superseded(&token, BuildReport::default()));
            }
            Err(error) => return Err(error),
        };

        // Reachable links with a mesh file
        let meshes = tree
            .links()
            .iter()
            .enumerate()
            .filter(|(index, _)| tree.link_frame(*index).is_some())
            .filter_map(|(index, link)| {
                let location = link.mesh_location(&request.mesh_root, &self.config)?;
                Some((index, link.name().to_string(), location))
            })
            .collect_vec();

        let activation = self.state.borrow_mut().on_description(&token, tree);
        if let Activation::Discarded(_) = activation {
            return Ok(self.superseded(&token, build));
        }

        let mut failed = vec![];
        let mut unsupported = None;
        let mut tasks = JoinSet::new();
        // Links whose task has not reported back yet
        let mut pending = BTreeMap::new();
        for (link, name, location) in meshes {
            if let Err(source) = MeshFormat::from_location(&location) {
                warn!(link = %name, %source, "unsupported mesh format");
                failed.push(name.clone());
                if unsupported.is_none() {
                    unsupported = Some(LoadError::UnsupportedFormat { link: name, source });
                }
                continue;
            }
            pending.insert(link, name.clone());
            let source = Arc::clone(&self.source);
            let config = Arc::clone(&self.config);
            tasks.spawn(async move {
                let result = match source.fetch(&location).await {
                    Ok(bytes) => load_mesh(&location, &bytes, &config),
                    Err(error) => Err(error),
                };
                (link, name, result)
            });
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((link, name, result)) => {
                    pending.remove(&link);
                    if self.state.borrow_mut().on_mesh(&token, link, result) == MeshOutcome::Failed {
                        failed.push(name);
                    }
                }
                Err(error) => warn!(%error, "mesh task did not finish"),
            }
        }
        // A task that panicked or was cancelled leaves its link without geometry
        failed.extend(pending.into_values());

        let status = self.state.borrow_mut().settle(&token, failed);
        match unsupported {
            Some(error) if status != LoadStatus::Superseded => Err(error),
            _ => Ok(LoadReport {
                generation: token.generation,
                status,
                build,
            }),
        }
    }

    fn build(&self, request: &LoadRequest, bytes: &[u8]) -> Result<(Tree, BuildReport), LoadError> {
        let description = if is_urdf(&request.description) {
            parse_urdf_str(std::str::from_utf8(bytes).map_err(DescriptionError::from)?)?
        } else {
            Description::from_json_slice(bytes)?
        };
        Ok(TreeBuilder::from_description(&description, &self.config)
            .color(request.color)
            .build()?)
    }
}

fn is_urdf(location: &str) -> bool {
    let path = location.split(['?', '#']).next().unwrap_or(location).to_ascii_lowercase();
    path.ends_with(".urdf") || path.ends_with(".xml")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::stl::tests::binary_triangle;
    use crate::asset::MemorySource;
    use crate::joint::{Joint, JointType};
    use crate::link::{Link, MeshRef};
    use nalgebra::Isometry3;

    fn tree(root: &str) -> Tree {
        let joint = Joint::new(
            "j",
            JointType::Revolute,
            root,
            "arm",
            (-1.0, 1.0),
            [0.0, 0.0, 1.0],
            Isometry3::identity(),
        );
        let links = vec![
            Link::new(root, Isometry3::identity(), MeshRef::None),
            Link::new("arm", Isometry3::identity(), MeshRef::Asset("arm.stl".to_string())),
        ];
        TreeBuilder::new(vec![joint], links).build().unwrap().0
    }

    fn mesh() -> MeshAsset {
        load_mesh("arm.stl", &binary_triangle(), &ViewerConfig::default()).unwrap()
    }

    #[test_log::test]
    fn test_latest_wins_and_previous_released_once() {
        let mut orchestrator = LoadOrchestrator::new();
        let first = orchestrator.issue();
        assert_eq!(
            orchestrator.on_description(&first, tree("a")),
            Activation::Activated { released: None }
        );
        assert_eq!(orchestrator.on_mesh(&first, 1, Ok(mesh())), MeshOutcome::Attached(ArenaIndex(5)));

        let second = orchestrator.issue();
        assert!(!orchestrator.is_current(&first));
        let Activation::Activated { released: Some(summary) } = orchestrator.on_description(&second, tree("b"))
        else {
            panic!("second tree should activate");
        };
        assert_eq!(summary, ReleaseSummary { meshes: 1, vertices: 3 });
        assert_eq!(orchestrator.active_generation(), Some(second.generation()));

        let released = orchestrator
            .events()
            .iter()
            .filter(|e| matches!(e, LoadEvent::Released { generation, .. } if *generation == first.generation()))
            .count();
        assert_eq!(released, 1);
    }

    #[test_log::test]
    fn test_stale_description_is_released() {
        let mut orchestrator = LoadOrchestrator::new();
        let first = orchestrator.issue();
        let second = orchestrator.issue();
        assert_eq!(
            orchestrator.on_description(&second, tree("b")),
            Activation::Activated { released: None }
        );
        assert_eq!(
            orchestrator.on_description(&first, tree("a")),
            Activation::Discarded(ReleaseSummary::default())
        );
        assert_eq!(orchestrator.active().unwrap().links()[0].name(), "b");
    }

    #[test_log::test]
    fn test_stale_mesh_dropped() {
        let mut orchestrator = LoadOrchestrator::new();
        let first = orchestrator.issue();
        orchestrator.on_description(&first, tree("a"));
        let second = orchestrator.issue();

        // `first` is still the active tree but no longer current
        assert_eq!(orchestrator.on_mesh(&first, 1, Ok(mesh())), MeshOutcome::Discarded);
        assert_eq!(orchestrator.active().unwrap().mesh_count(), 0);
        assert_eq!(orchestrator.settle(&first, vec![]), LoadStatus::Superseded);

        orchestrator.on_description(&second, tree("b"));
        assert_eq!(orchestrator.on_mesh(&second, 1, Ok(mesh())), MeshOutcome::Attached(ArenaIndex(5)));
    }

    #[test_log::test]
    fn test_failed_mesh_degrades_link_only() {
        let mut orchestrator = LoadOrchestrator::new();
        let token = orchestrator.issue();
        orchestrator.on_description(&token, tree("a"));
        let outcome = orchestrator.on_mesh(&token, 1, Err(AssetError::NotFound("arm.stl".to_string())));
        assert_eq!(outcome, MeshOutcome::Failed);
        assert!(orchestrator.active().is_some());
        assert_eq!(
            orchestrator.settle(&token, vec!["arm".to_string()]),
            LoadStatus::Partial {
                failed: vec!["arm".to_string()]
            }
        );
    }

    /// Mesh fetches for `arm` crash their task
    struct CrashingSource(MemorySource);

    impl AssetSource for CrashingSource {
        fn fetch(&self, location: &str) -> impl std::future::Future<Output = Result<Vec<u8>, AssetError>> + Send {
            let crash = location.ends_with("arm.stl");
            let fetch = self.0.fetch(location);
            async move {
                if crash {
                    panic!("fetch crashed");
                }
                fetch.await
            }
        }
    }

    #[test_log::test(tokio::test)]
    async fn test_crashed_task_reports_link_name() {
        let description = r#"{
  "joints": [
    {"name": "j1", "type": "revolute", "parent": "base", "child": "arm"},
    {"name": "j2", "type": "revolute", "parent": "arm", "child": "hand"}
  ],
  "links": [
    {"name": "base"},
    {"name": "arm", "visual": [{"mesh": "arm.stl"}]},
    {"name": "hand", "visual": [{"mesh": "hand.stl"}]}
  ]
}"#;
        let mut source = MemorySource::new();
        source
            .insert("r.json", description)
            .insert("r/meshes/arm.stl", binary_triangle())
            .insert("r/meshes/hand.stl", binary_triangle());
        let viewer = Viewer::new(CrashingSource(source), ViewerConfig::default());

        let report = viewer.load(LoadRequest::new("r.json", "r")).await.unwrap();
        assert_eq!(
            report.status,
            LoadStatus::Partial {
                failed: vec!["arm".to_string()]
            }
        );
        viewer
            .with_active(|tree| {
                assert!(tree.mesh(1).is_none());
                assert!(tree.mesh(2).is_some());
            })
            .unwrap();
    }

    #[test_log::test]
    fn test_description_dispatch() {
        assert!(is_urdf("robots/miro.URDF"));
        assert!(is_urdf("robots/miro.xml?rev=2"));
        assert!(!is_urdf("robots/miro.json"));
        assert!(!is_urdf("robots/miro"));
    }
}
