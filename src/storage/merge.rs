//! Row merge rules shared by every store.
//!
//! Scalars: a known new value replaces the old one, an unknown one keeps it.
//! JSON columns: shallow key-wise merge, new keys win, missing keys survive.
//! `PgStore` expresses the same rules as `COALESCE(excluded.x, t.x)` and
//! `COALESCE(t.j, '{}') || COALESCE(excluded.j, '{}')` in its `ON CONFLICT`
//! clauses; a rule changed here must change there too.

use crate::models::{
    Extra, Game, League, Player, PlayerGameStat, PlayerSeasonStat, SquadMembership, Team,
};

pub trait Merge {
    /// Fold a newer partial record into the stored one.
    fn merge(&mut self, newer: Self);
}

fn keep<T>(old: &mut Option<T>, new: Option<T>) {
    if new.is_some() {
        *old = new;
    }
}

pub fn merge_json(old: &mut Extra, new: Extra) {
    for (k, v) in new {
        old.insert(k, v);
    }
}

impl Merge for League {
    fn merge(&mut self, n: Self) {
        keep(&mut self.sport_id, n.sport_id);
        keep(&mut self.name, n.name);
        keep(&mut self.slug, n.slug);
        keep(&mut self.abbreviation, n.abbreviation);
        keep(&mut self.country, n.country);
        keep(&mut self.kind, n.kind);
        merge_json(&mut self.extra, n.extra);
    }
}

impl Merge for Team {
    fn merge(&mut self, n: Self) {
        keep(&mut self.name, n.name);
        keep(&mut self.code, n.code);
        keep(&mut self.logo_url, n.logo_url);
        merge_json(&mut self.extra, n.extra);
    }
}

impl Merge for Player {
    fn merge(&mut self, n: Self) {
        keep(&mut self.name, n.name);
        keep(&mut self.lastname, n.lastname);
        keep(&mut self.birth_date, n.birth_date);
        keep(&mut self.height_cm, n.height_cm);
        keep(&mut self.weight_kg, n.weight_kg);
        keep(&mut self.nationality, n.nationality);
        keep(&mut self.photo_url, n.photo_url);
        merge_json(&mut self.biometrics, n.biometrics);
    }
}

impl Merge for SquadMembership {
    fn merge(&mut self, n: Self) {
        keep(&mut self.position, n.position);
        keep(&mut self.jersey_number, n.jersey_number);
        self.is_active = n.is_active;
    }
}

impl Merge for Game {
    fn merge(&mut self, n: Self) {
        keep(&mut self.season_id, n.season_id);
        keep(&mut self.league_id, n.league_id);
        keep(&mut self.home_team_id, n.home_team_id);
        keep(&mut self.away_team_id, n.away_team_id);
        keep(&mut self.game_date, n.game_date);
        keep(&mut self.status, n.status);
        keep(&mut self.home_score, n.home_score);
        keep(&mut self.away_score, n.away_score);
        merge_json(&mut self.score_detail, n.score_detail);
    }
}

impl Merge for PlayerSeasonStat {
    fn merge(&mut self, n: Self) {
        merge_json(&mut self.stats, n.stats);
    }
}

impl Merge for PlayerGameStat {
    fn merge(&mut self, n: Self) {
        keep(&mut self.team_id, n.team_id);
        keep(&mut self.minutes_played, n.minutes_played);
        keep(&mut self.rating, n.rating);
        merge_json(&mut self.stats, n.stats);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GameStatus, put};
    use serde_json::json;

    #[test]
    fn test_name_then_height() {
        let mut stored = Player {
            id: 7,
            name: Some("Kim".into()),
            ..Default::default()
        };
        stored.merge(Player {
            id: 7,
            height_cm: Some(183),
            ..Default::default()
        });
        assert_eq!(stored.name.as_deref(), Some("Kim"));
        assert_eq!(stored.height_cm, Some(183));
    }

    #[test]
    fn test_json_keys_survive() {
        let mut stored = Team::default();
        put(&mut stored.extra, "color", Some("004c97"));
        put(&mut stored.extra, "venue", Some("Jamsil"));

        let mut newer = Team::default();
        put(&mut newer.extra, "color", Some("131230"));
        put(&mut newer.extra, "short", Some("OB"));
        stored.merge(newer);

        assert_eq!(stored.extra["color"], json!("131230"));
        assert_eq!(stored.extra["venue"], json!("Jamsil"));
        assert_eq!(stored.extra["short"], json!("OB"));
    }

    #[test]
    fn test_merge_idempotent() {
        let game = Game {
            id: 1,
            status: Some(GameStatus::Final),
            home_score: Some(3),
            ..Default::default()
        };
        let mut once = game.clone();
        once.merge(game.clone());
        let mut twice = once.clone();
        twice.merge(game.clone());
        assert_eq!(once, game);
        assert_eq!(twice, once);
    }

    #[test]
    fn test_unknown_score_keeps_old() {
        let mut stored = Game {
            id: 1,
            home_score: Some(2),
            away_score: Some(1),
            status: Some(GameStatus::Final),
            ..Default::default()
        };
        stored.merge(Game {
            id: 1,
            status: Some(GameStatus::Final),
            ..Default::default()
        });
        assert_eq!(stored.home_score, Some(2));
        assert_eq!(stored.away_score, Some(1));
    }
}
