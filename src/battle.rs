// battle.rs
// Automatic turn-based battle between two catalog records. A Battle advances one
// turn per step() call; drive() paces the calls on a timer.

use crate::pokemon::{ATTACK, DEFENSE, PokemonRecord, SPECIAL_ATTACK, SPECIAL_DEFENSE, SPEED};
use serde::Serialize;
use std::time::Duration;
use tokio::time::MissedTickBehavior;

/// Damage dealt by a hit that would otherwise do nothing.
pub const MIN_DAMAGE: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Player,
    Enemy,
}

impl Side {
    pub fn opponent(self) -> Side {
        match self {
            Side::Player => Side::Enemy,
            Side::Enemy => Side::Player,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Winner(Side),
    Draw,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    NotStarted,
    InProgress,
    Finished(Outcome),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TurnEvent {
    pub turn: u32,
    pub attacker: Side,
    pub attacker_name: String,
    pub defender_name: String,
    pub special: bool,
    pub damage: u32,
    pub defender_hp: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hit {
    pub damage: u32,
    pub special: bool,
}

/// The attacker uses its better attacking stat; a special attack is blocked by
/// special defense, a physical one by defense. Ties count as physical.
pub fn resolve_hit(attacker: &PokemonRecord, defender: &PokemonRecord) -> Hit {
    let physical = attacker.stat(ATTACK);
    let special_power = attacker.stat(SPECIAL_ATTACK);
    let special = special_power > physical;

    let (power, guard) = if special {
        (special_power, defender.stat(SPECIAL_DEFENSE))
    } else {
        (physical, defender.stat(DEFENSE))
    };

    Hit {
        damage: power.saturating_sub(guard).max(MIN_DAMAGE),
        special,
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Battle {
    player: PokemonRecord,
    enemy: PokemonRecord,
    player_hp: u32,
    enemy_hp: u32,
    turn_owner: Side,
    phase: Phase,
    turns: Vec<TurnEvent>,
}

impl Battle {
    pub fn new(player: PokemonRecord, enemy: PokemonRecord) -> Self {
        let turn_owner = if player.stat(SPEED) >= enemy.stat(SPEED) {
            Side::Player
        } else {
            Side::Enemy
        };
        tracing::debug!(
            "Battle {} vs {}, {:?} moves first",
            player.name,
            enemy.name,
            turn_owner
        );

        Self {
            player_hp: player.hp(),
            enemy_hp: enemy.hp(),
            player,
            enemy,
            turn_owner,
            phase: Phase::NotStarted,
            turns: Vec::new(),
        }
    }

    pub fn player(&self) -> &PokemonRecord {
        &self.player
    }

    pub fn enemy(&self) -> &PokemonRecord {
        &self.enemy
    }

    pub fn hp(&self, side: Side) -> u32 {
        match side {
            Side::Player => self.player_hp,
            Side::Enemy => self.enemy_hp,
        }
    }

    pub fn turn_owner(&self) -> Side {
        self.turn_owner
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn turns(&self) -> &[TurnEvent] {
        &self.turns
    }

    pub fn is_over(&self) -> bool {
        matches!(self.phase, Phase::Finished(_))
    }

    pub fn outcome(&self) -> Option<Outcome> {
        match self.phase {
            Phase::Finished(outcome) => Some(outcome),
            _ => None,
        }
    }

    fn record(&self, side: Side) -> &PokemonRecord {
        match side {
            Side::Player => &self.player,
            Side::Enemy => &self.enemy,
        }
    }

    /// Status line for display.
    pub fn message(&self) -> String {
        match (self.phase, self.turns.last()) {
            (Phase::Finished(Outcome::Winner(side)), _) => {
                format!("{} wins!", capitalize(&self.record(side).name))
            }
            (Phase::Finished(Outcome::Draw), _) => "It's a draw!".to_string(),
            (Phase::InProgress, Some(last)) => {
                format!("{} attacks!", capitalize(&last.attacker_name))
            }
            _ => "The battle begins!".to_string(),
        }
    }

    fn check_outcome(&self) -> Option<Outcome> {
        match (self.player_hp, self.enemy_hp) {
            (0, 0) => Some(Outcome::Draw),
            (0, _) => Some(Outcome::Winner(Side::Enemy)),
            (_, 0) => Some(Outcome::Winner(Side::Player)),
            _ => None,
        }
    }

    fn finish(&mut self, outcome: Outcome) {
        tracing::info!(
            "Battle {} vs {} finished after {} turns: {:?}",
            self.player.name,
            self.enemy.name,
            self.turns.len(),
            outcome
        );
        self.phase = Phase::Finished(outcome);
    }

    /// Plays exactly one turn. Returns `None` once the battle is finished.
    pub fn step(&mut self) -> Option<TurnEvent> {
        match self.phase {
            Phase::Finished(_) => return None,
            Phase::NotStarted => self.phase = Phase::InProgress,
            Phase::InProgress => {}
        }

        // A combatant may enter with 0 hp.
        if let Some(outcome) = self.check_outcome() {
            self.finish(outcome);
            return None;
        }

        let attacker = self.turn_owner;
        let defender = attacker.opponent();
        let hit = resolve_hit(self.record(attacker), self.record(defender));

        let defender_hp = match defender {
            Side::Player => &mut self.player_hp,
            Side::Enemy => &mut self.enemy_hp,
        };
        *defender_hp = defender_hp.saturating_sub(hit.damage);

        let event = TurnEvent {
            turn: turn_number(self.turns.len()),
            attacker,
            attacker_name: self.record(attacker).name.clone(),
            defender_name: self.record(defender).name.clone(),
            special: hit.special,
            damage: hit.damage,
            defender_hp: self.hp(defender),
        };
        tracing::debug!(
            "Turn {}: {} hits {} for {} ({} hp left)",
            event.turn,
            event.attacker_name,
            event.defender_name,
            event.damage,
            event.defender_hp
        );
        self.turns.push(event.clone());
        self.turn_owner = defender;

        if let Some(outcome) = self.check_outcome() {
            self.finish(outcome);
        }
        Some(event)
    }

    /// Steps until the battle is over.
    pub fn run_to_end(&mut self) -> Outcome {
        loop {
            if let Phase::Finished(outcome) = self.phase {
                return outcome;
            }
            self.step();
        }
    }
}

/// Calls `tick` once per `turn_delay` until it returns `false`. The first call
/// happens after one full delay. Dropping the future stops the loop.
pub async fn drive<F>(turn_delay: Duration, mut tick: F)
where
    F: FnMut() -> bool,
{
    if turn_delay.is_zero() {
        while tick() {
            tokio::task::yield_now().await;
        }
        return;
    }

    let mut interval = tokio::time::interval(turn_delay);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval.tick().await;
    loop {
        interval.tick().await;
        if !tick() {
            break;
        }
    }
}

/// 1-based number of the turn after `completed` turns, saturating at `u32::MAX`.
fn turn_number(completed: usize) -> u32 {
    u32::try_from(completed).unwrap_or(u32::MAX).saturating_add(1)
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}
