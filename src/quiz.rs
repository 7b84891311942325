use crate::catalog::CatalogStore;
use crate::pokemon::PokemonRecord;
use rand::Rng;
use rand::seq::SliceRandom;

/// One round of the unscramble-the-name game. Replaced wholesale by the next round.
#[derive(Debug, Clone)]
pub struct QuizState {
    target: PokemonRecord,
    scrambled: String,
    last_guess_correct: Option<bool>,
}

impl QuizState {
    /// Picks a random record and shuffles its name. `None` on an empty catalog.
    pub fn start_round<R: Rng + ?Sized>(catalog: &CatalogStore, rng: &mut R) -> Option<Self> {
        let target = catalog.random(rng)?.clone();
        let scrambled = scramble(&target.name, rng);
        tracing::debug!("Quiz round started for Pokémon ID: {}", target.id);
        Some(Self {
            target,
            scrambled,
            last_guess_correct: None,
        })
    }

    pub fn next_round<R: Rng + ?Sized>(catalog: &CatalogStore, rng: &mut R) -> Option<Self> {
        Self::start_round(catalog, rng)
    }

    pub fn scrambled(&self) -> &str {
        &self.scrambled
    }

    pub fn target(&self) -> &PokemonRecord {
        &self.target
    }

    pub fn last_guess_correct(&self) -> Option<bool> {
        self.last_guess_correct
    }

    /// Case-insensitive exact comparison with the target name.
    pub fn submit_guess(&mut self, guess: &str) -> bool {
        let correct = guess.to_lowercase() == self.target.name.to_lowercase();
        self.last_guess_correct = Some(correct);
        correct
    }

    pub fn message(&self) -> &'static str {
        match self.last_guess_correct {
            None => "Try to unscramble the name!",
            Some(true) => "Correct! Here's another one.",
            Some(false) => "Wrong! Try again.",
        }
    }
}

pub fn scramble<R: Rng + ?Sized>(name: &str, rng: &mut R) -> String {
    let mut letters: Vec<char> = name.chars().collect();
    letters.shuffle(rng);
    letters.into_iter().collect()
}
