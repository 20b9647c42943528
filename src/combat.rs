//! 战斗协作者
//!
//! The turn manager only knows the [`CombatCollaborator`] seam. The bundled
//! [`BasicCombat`] chases the player greedily, trades blows on contact and
//! handles bomber explosions and item pickups.

use std::cell::RefCell;

use dungeon::{Direction, EnemyKind, ItemKind, Position};
use hecs::Entity;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use strum::IntoEnumIterator;

use crate::event_bus::{Combatant, GameEvent};
use crate::turn_system::OccupiedTiles;
use crate::world::{Enemy, GameWorld, GroundItem, Health};

/// Result of the player striking an enemy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttackOutcome {
    Hit { damage: u32, remaining: u32 },
    Defeated { kind: EnemyKind },
    /// The target was already gone.
    Missed,
}

/// Synchronous combat rules. Implementations raise events through
/// [`GameWorld::outbox`] rather than publishing while the world is borrowed.
pub trait CombatCollaborator {
    /// Act for one enemy during the enemy phase.
    fn handle_single_enemy_movement(
        &self,
        world: &mut GameWorld,
        occupied: &mut OccupiedTiles,
        enemy: Entity,
    );

    fn handle_player_attack(&self, world: &mut GameWorld, enemy: Entity) -> AttackOutcome;

    /// Resolve whatever the player is standing on once a phase ends.
    fn check_collisions(&self, world: &mut GameWorld);
}

/// Enemies further away than this wander instead of chasing.
const CHASE_RANGE: u32 = 8;
const EXPLOSION_DAMAGE: u32 = 2;
const POTION_HEAL: u32 = 3;

pub struct BasicCombat {
    rng: RefCell<StdRng>,
}

impl BasicCombat {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: RefCell::new(StdRng::seed_from_u64(seed)),
        }
    }

    fn damage_player(world: &mut GameWorld, attacker: EnemyKind, damage: u32) {
        world.player.hp = world.player.hp.saturating_sub(damage);
        world.log(format!("The {attacker} hits you for {damage}."));
        world.outbox.push(GameEvent::Attack {
            attacker: Combatant::Enemy(attacker),
            target: Combatant::Player,
            damage,
        });
        if !world.player.is_alive() {
            world.log("You collapse.");
        }
    }

    fn step_candidates(&self, from: Position, target: Position) -> Vec<Direction> {
        if from.manhattan(&target) > CHASE_RANGE {
            let mut rng = self.rng.borrow_mut();
            if rng.random_bool(0.5) {
                return Vec::new();
            }
            let all: Vec<Direction> = Direction::iter().collect();
            return vec![all[rng.random_range(0..all.len())]];
        }
        let mut dirs: Vec<Direction> = Direction::iter().collect();
        dirs.sort_by_key(|dir| from.step(*dir).manhattan(&target));
        dirs.retain(|dir| from.step(*dir).manhattan(&target) < from.manhattan(&target));
        dirs
    }
}

impl Default for BasicCombat {
    fn default() -> Self {
        Self::new(0)
    }
}

/// 击杀敌人：记录击败、移出名单，炸弹怪会连锁爆炸
pub fn defeat_enemy(world: &mut GameWorld, enemy: Entity) {
    let Ok(info) = world.entities.get::<&Enemy>(enemy).map(|e| (*e).clone()) else {
        return;
    };
    let position = world.enemy_position(enemy).unwrap_or_default();

    world.defeated.insert(info.spawn_key.clone());
    world.remove_enemy(enemy);
    world.log(format!("The {} is defeated.", info.kind));
    world.outbox.push(GameEvent::EnemyDefeated {
        kind: info.kind,
        position,
    });
    tracing::debug!(kind = %info.kind, x = position.x, y = position.y, "enemy defeated");

    if info.kind == EnemyKind::Bomber {
        explode(world, position);
    }
}

fn explode(world: &mut GameWorld, center: Position) {
    world.log("Boom!");
    world.outbox.push(GameEvent::Explosion { position: center });

    if world.player.position.is_adjacent(&center) {
        BasicCombat::damage_player(world, EnemyKind::Bomber, EXPLOSION_DAMAGE);
    }

    let caught: Vec<Entity> = world
        .enemies
        .iter()
        .copied()
        .filter(|e| {
            world
                .enemy_position(*e)
                .is_some_and(|pos| pos.is_adjacent(&center))
        })
        .collect();
    for victim in caught {
        let died = world
            .entities
            .get::<&mut Health>(victim)
            .map(|mut health| health.take_damage(EXPLOSION_DAMAGE))
            .unwrap_or(false);
        if died {
            defeat_enemy(world, victim);
        }
    }
}

impl CombatCollaborator for BasicCombat {
    fn handle_single_enemy_movement(
        &self,
        world: &mut GameWorld,
        occupied: &mut OccupiedTiles,
        enemy: Entity,
    ) {
        let (Some(from), Some(kind)) = (world.enemy_position(enemy), world.enemy_kind(enemy)) else {
            return;
        };
        let player = world.player.position;

        if from.is_adjacent(&player) {
            if kind == EnemyKind::Bomber {
                // bombers detonate instead of biting
                defeat_enemy(world, enemy);
            } else {
                BasicCombat::damage_player(world, kind, kind.attack());
                occupied.claim(from);
            }
            return;
        }

        let destination = self
            .step_candidates(from, player)
            .into_iter()
            .map(|dir| from.step(dir))
            .find(|pos| {
                world.grid.is_walkable(*pos)
                    && !occupied.is_occupied(*pos)
                    && world.enemy_at(*pos).is_none()
            });

        match destination {
            Some(to) => {
                if let Ok(mut pos) = world.entities.get::<&mut Position>(enemy) {
                    *pos = to;
                }
                occupied.claim(to);
            }
            None => {
                occupied.claim(from);
            }
        }
    }

    fn handle_player_attack(&self, world: &mut GameWorld, enemy: Entity) -> AttackOutcome {
        if !world.is_enemy_active(enemy) {
            return AttackOutcome::Missed;
        }
        let damage = world.player.attack;
        let kind = world.enemy_kind(enemy).unwrap_or(EnemyKind::Slime);
        let remaining = match world.entities.get::<&mut Health>(enemy) {
            Ok(mut health) => {
                health.take_damage(damage);
                health.current
            }
            Err(_) => return AttackOutcome::Missed,
        };
        world.outbox.push(GameEvent::Attack {
            attacker: Combatant::Player,
            target: Combatant::Enemy(kind),
            damage,
        });

        if remaining == 0 {
            defeat_enemy(world, enemy);
            AttackOutcome::Defeated { kind }
        } else {
            world.log(format!("You hit the {kind}."));
            AttackOutcome::Hit { damage, remaining }
        }
    }

    fn check_collisions(&self, world: &mut GameWorld) {
        let position = world.player.position;
        let Some(entity) = world.item_at(position) else {
            return;
        };
        let Ok(item) = world.entities.get::<&GroundItem>(entity).map(|i| (*i).clone()) else {
            return;
        };
        let _ = world.entities.despawn(entity);
        world.collected.insert(item.spawn_key);
        world.player.inventory.add(item.kind, 1);
        world.log(format!("You pick up a {}.", item.kind));
        world.outbox.push(GameEvent::ItemPickedUp { kind: item.kind });
    }
}

/// 使用物品（目前只有治疗药水）
pub fn use_item(world: &mut GameWorld, kind: ItemKind) -> bool {
    if !kind.is_usable() || !world.player.inventory.take(kind) {
        return false;
    }
    let healed = world.player.heal(POTION_HEAL);
    world.log(format!("You drink a potion and recover {healed} hp."));
    world.outbox.push(GameEvent::ItemUsed { kind });
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use dungeon::Grid;

    fn world() -> GameWorld {
        let grid = Grid::from_rows(&[
            "#######",
            "#.....#",
            "#.....#",
            "#.....#",
            "#######",
        ])
        .unwrap();
        GameWorld::with_grid(grid, Position::new(1, 2))
    }

    #[test]
    fn enemies_step_toward_the_player() {
        let mut world = world();
        let e = world.spawn_enemy(EnemyKind::Slime, Position::new(4, 2), "e".into());
        let mut occupied = OccupiedTiles::default();
        occupied.claim(world.player.position);

        BasicCombat::new(1).handle_single_enemy_movement(&mut world, &mut occupied, e);
        assert_eq!(world.enemy_position(e), Some(Position::new(3, 2)));
        assert!(occupied.is_occupied(Position::new(3, 2)));
    }

    #[test]
    fn claimed_tiles_block_movement() {
        let mut world = world();
        let e = world.spawn_enemy(EnemyKind::Slime, Position::new(3, 2), "e".into());
        let mut occupied = OccupiedTiles::default();
        occupied.claim(world.player.position);
        occupied.claim(Position::new(2, 2));

        BasicCombat::new(1).handle_single_enemy_movement(&mut world, &mut occupied, e);
        // the only closer tile is taken, so the enemy holds its ground
        assert_eq!(world.enemy_position(e), Some(Position::new(3, 2)));
    }

    #[test]
    fn adjacent_enemies_attack() {
        let mut world = world();
        let e = world.spawn_enemy(EnemyKind::Skeleton, Position::new(2, 2), "e".into());
        let mut occupied = OccupiedTiles::default();
        BasicCombat::new(1).handle_single_enemy_movement(&mut world, &mut occupied, e);
        assert_eq!(world.player.hp, 8);
        assert!(matches!(world.outbox[0], GameEvent::Attack { damage: 2, .. }));
    }

    #[test]
    fn bomber_takes_neighbours_with_it() {
        let mut world = world();
        let bomber = world.spawn_enemy(EnemyKind::Bomber, Position::new(2, 2), "b".into());
        let slime = world.spawn_enemy(EnemyKind::Slime, Position::new(2, 1), "s".into());
        let far = world.spawn_enemy(EnemyKind::Slime, Position::new(5, 3), "f".into());
        let mut occupied = OccupiedTiles::default();

        BasicCombat::new(1).handle_single_enemy_movement(&mut world, &mut occupied, bomber);
        assert_eq!(world.enemies, vec![far]);
        assert!(!world.is_enemy_active(slime));
        assert_eq!(world.player.hp, 8);
        assert!(world.defeated.contains("b") && world.defeated.contains("s"));
    }

    #[test]
    fn player_attack_defeats_weak_enemies() {
        let mut world = world();
        let e = world.spawn_enemy(EnemyKind::Slime, Position::new(2, 2), "e".into());
        let combat = BasicCombat::default();
        assert_eq!(
            combat.handle_player_attack(&mut world, e),
            AttackOutcome::Hit { damage: 1, remaining: 1 }
        );
        assert_eq!(
            combat.handle_player_attack(&mut world, e),
            AttackOutcome::Defeated { kind: EnemyKind::Slime }
        );
        assert_eq!(combat.handle_player_attack(&mut world, e), AttackOutcome::Missed);
        assert!(world.enemies.is_empty());
    }

    #[test]
    fn standing_on_items_picks_them_up() {
        let mut world = world();
        world.spawn_item(ItemKind::HealingPotion, Position::new(1, 2), "p".into());
        BasicCombat::default().check_collisions(&mut world);
        assert_eq!(world.player.inventory.count(ItemKind::HealingPotion), 1);
        assert!(world.collected.contains("p"));
        assert!(world.item_at(Position::new(1, 2)).is_none());

        world.player.hp = 5;
        assert!(use_item(&mut world, ItemKind::HealingPotion));
        assert_eq!(world.player.hp, 8);
        assert!(!use_item(&mut world, ItemKind::HealingPotion));
    }
}
