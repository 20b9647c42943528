//! 服务容器
//!
//! Bundles the shared handles every turn-core component needs, so they are
//! passed explicitly instead of being looked up globally.

use std::cell::RefCell;
use std::rc::Rc;

use dungeon::{BasicZoneGenerator, ZoneGenerator};
use error::GameError;

use crate::animation::AnimationScheduler;
use crate::collaborators::{
    AudioCollaborator, GridViewport, NullRenderer, RenderCollaborator, SilentAudio, Viewport,
};
use crate::combat::{BasicCombat, CombatCollaborator};
use crate::config::GameConfig;
use crate::event_bus::EventBus;
use crate::world::GameWorld;

#[derive(Clone)]
pub struct Services {
    pub bus: EventBus,
    pub scheduler: AnimationScheduler,
    pub world: Rc<RefCell<GameWorld>>,
    pub combat: Rc<dyn CombatCollaborator>,
    pub renderer: Rc<dyn RenderCollaborator>,
    pub audio: Rc<dyn AudioCollaborator>,
    pub viewport: Rc<dyn Viewport>,
    pub zones: Rc<dyn ZoneGenerator>,
    pub config: Rc<GameConfig>,
    missing: Rc<[&'static str]>,
}

/// 记录协作者错误：暂时性的平台失败只是警告
pub fn report_collaborator_error(operation: &'static str, err: &GameError) {
    if err.is_transient() {
        tracing::warn!(operation, error = %err, "collaborator call failed");
    } else {
        tracing::error!(operation, error = %err, "collaborator call failed");
    }
}

impl Services {
    pub fn builder(world: GameWorld) -> ServicesBuilder {
        ServicesBuilder::new(world)
    }

    /// Publish events the world collected while it was borrowed.
    pub fn flush_events(&self) {
        let events = self.world.borrow_mut().take_events();
        for event in &events {
            self.bus.publish(event);
        }
    }

    pub fn render(&self) {
        self.renderer.render(&self.world.borrow());
    }

    /// 播放音效；失败只记录日志
    pub fn play_sound(&self, name: &str) {
        if let Err(err) = self.audio.play_sound(name) {
            report_collaborator_error("play_sound", &err);
        }
    }

    /// Platform collaborators that were not configured and run as inert stand-ins.
    pub fn missing_collaborators(&self) -> &[&'static str] {
        &self.missing
    }
}

pub struct ServicesBuilder {
    world: GameWorld,
    bus: Option<EventBus>,
    scheduler: Option<AnimationScheduler>,
    combat: Option<Rc<dyn CombatCollaborator>>,
    renderer: Option<Rc<dyn RenderCollaborator>>,
    audio: Option<Rc<dyn AudioCollaborator>>,
    viewport: Option<Rc<dyn Viewport>>,
    zones: Option<Rc<dyn ZoneGenerator>>,
    config: GameConfig,
}

impl ServicesBuilder {
    pub fn new(world: GameWorld) -> Self {
        Self {
            world,
            bus: None,
            scheduler: None,
            combat: None,
            renderer: None,
            audio: None,
            viewport: None,
            zones: None,
            config: GameConfig::default(),
        }
    }

    pub fn bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn scheduler(mut self, scheduler: AnimationScheduler) -> Self {
        self.scheduler = Some(scheduler);
        self
    }

    pub fn combat(mut self, combat: Rc<dyn CombatCollaborator>) -> Self {
        self.combat = Some(combat);
        self
    }

    pub fn renderer(mut self, renderer: Rc<dyn RenderCollaborator>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn audio(mut self, audio: Rc<dyn AudioCollaborator>) -> Self {
        self.audio = Some(audio);
        self
    }

    pub fn viewport(mut self, viewport: Rc<dyn Viewport>) -> Self {
        self.viewport = Some(viewport);
        self
    }

    pub fn zones(mut self, zones: Rc<dyn ZoneGenerator>) -> Self {
        self.zones = Some(zones);
        self
    }

    pub fn config(mut self, config: GameConfig) -> Self {
        self.config = config;
        self
    }

    /// Missing platform collaborators are a misconfiguration: they are
    /// reported loudly and replaced by inert stand-ins.
    pub fn build(self) -> Services {
        let seed = self.config.seed.unwrap_or(self.world.generation.seed);
        let (width, height) = (self.world.grid.width(), self.world.grid.height());
        let config = self.config;
        let mut missing = Vec::new();

        let renderer = self.renderer.unwrap_or_else(|| {
            missing.push("renderer");
            tracing::error!(
                error = %GameError::MissingCollaborator("renderer"),
                "rendering disabled"
            );
            Rc::new(NullRenderer)
        });
        let audio = self.audio.unwrap_or_else(|| {
            missing.push("audio");
            tracing::warn!(
                error = %GameError::MissingCollaborator("audio"),
                "sounds disabled"
            );
            Rc::new(SilentAudio)
        });
        let viewport = self.viewport.unwrap_or_else(|| {
            missing.push("viewport");
            tracing::error!(
                error = %GameError::MissingCollaborator("viewport"),
                "using unit tiles"
            );
            Rc::new(GridViewport::new(1.0, width, height))
        });
        let zones = self.zones.unwrap_or_else(|| {
            Rc::new(BasicZoneGenerator::new(
                config.zone_width,
                config.zone_height,
            ))
        });
        let combat = self
            .combat
            .unwrap_or_else(|| Rc::new(BasicCombat::new(seed)));

        Services {
            bus: self.bus.unwrap_or_default(),
            scheduler: self.scheduler.unwrap_or_default(),
            world: Rc::new(RefCell::new(self.world)),
            combat,
            renderer,
            audio,
            viewport,
            zones,
            config: Rc::new(config),
            missing: missing.into(),
        }
    }
}
