use serde::{Deserialize, Serialize};
use tracing::info;

/// Scenes a peer moves through during a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scene {
    /// Matchmaking entry point, outside any room
    Launcher,
    /// Both players pick a team
    TeamSelection,
    /// The match itself
    Arena,
}

impl Scene {
    /// Build index of the scene
    pub fn build_index(self) -> u8 {
        match self {
            Scene::Launcher => 0,
            Scene::TeamSelection => 1,
            Scene::Arena => 2,
        }
    }
}

/// A completed scene change
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SceneTransition {
    pub from: Scene,
    pub to: Scene,
}

impl SceneTransition {
    /// Loading the scene that is already active counts as a reload
    pub fn is_reload(&self) -> bool {
        self.from == self.to
    }
}

/// Tracks the active scene of one peer
#[derive(Debug)]
pub struct SceneDirector {
    current: Scene,
}

impl SceneDirector {
    pub fn new() -> Self {
        Self {
            current: Scene::Launcher,
        }
    }

    pub fn current(&self) -> Scene {
        self.current
    }

    pub fn is(&self, scene: Scene) -> bool {
        self.current == scene
    }

    pub fn load(&mut self, scene: Scene) -> SceneTransition {
        let transition = SceneTransition {
            from: self.current,
            to: scene,
        };
        self.current = scene;
        info!("Loaded scene {:?} (index {})", scene, scene.build_index());
        transition
    }
}

impl Default for SceneDirector {
    fn default() -> Self {
        Self::new()
    }
}
