use crate::game::world::{token_anchor, FeedbackToken, World};

// --- Judgment windows, in normalized beat phase ---
// Tuned gameplay constants; half-open intervals. Do not derive these.

pub const PERFECT_WINDOW: f32 = 0.08;
pub const GOOD_WINDOW: f32 = 0.22;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Grade {
    Perfect,
    Good,
    Miss,
}

impl Grade {
    pub fn points(self) -> u32 {
        match self {
            Grade::Perfect => 1000,
            Grade::Good => 500,
            Grade::Miss => 0,
        }
    }

    /// Camera-shake impulse for the hit feedback.
    pub fn shake_impulse(self) -> f32 {
        match self {
            Grade::Perfect => 14.0,
            Grade::Good => 7.0,
            Grade::Miss => 3.0,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Grade::Perfect => "PERFECT",
            Grade::Good => "GOOD",
            Grade::Miss => "MISS",
        }
    }

    pub fn color(self) -> [f32; 4] {
        match self {
            Grade::Perfect => [0.30, 1.00, 0.85, 1.0],
            Grade::Good => [1.00, 0.85, 0.25, 1.0],
            Grade::Miss => [1.00, 0.25, 0.45, 1.0],
        }
    }

    /// Silhouette height a building snaps to when locked with this grade.
    fn locked_height(self) -> f32 {
        match self {
            Grade::Perfect => 1.0,
            Grade::Good => 0.72,
            Grade::Miss => 0.0,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct JudgeResult {
    pub grade: Grade,
    pub base_points: u32,
}

/// Distance of `audio_time` to the nearest beat boundary, normalized to
/// [0, 0.5] and symmetric around the boundary.
pub fn phase_error(audio_time: f64, seconds_per_beat: f64) -> f32 {
    let progress = (audio_time.rem_euclid(seconds_per_beat) / seconds_per_beat) as f32;
    progress.min(1.0 - progress)
}

pub fn classify(error: f32) -> Grade {
    if error < PERFECT_WINDOW {
        Grade::Perfect
    } else if error < GOOD_WINDOW {
        Grade::Good
    } else {
        Grade::Miss
    }
}

/// Judges one lock attempt against the beat grid. Picks the unlocked target
/// nearest the judgment line, classifies the phase error, and on a hit locks
/// the target exactly once. Returns `None` when no target is eligible.
pub fn judge_input(world: &mut World, audio_time: f64, seconds_per_beat: f64) -> Option<JudgeResult> {
    let index = world.nearest_unlocked_index()?;
    let error = phase_error(audio_time, seconds_per_beat);
    let grade = classify(error);

    let anchor = {
        let target = &mut world.targets[index];
        match grade {
            Grade::Perfect | Grade::Good => {
                target.locked = true;
                target.quality = Some(grade);
                target.height = grade.locked_height();
            }
            // An off-beat press leaves the target untouched: it stays the
            // nearest candidate until it expires past the line, so spamming
            // keeps missing the same building.
            Grade::Miss => {}
        }
        token_anchor(target)
    };
    world
        .tokens
        .push(FeedbackToken::new(grade.label(), grade.color(), anchor.0, anchor.1));

    Some(JudgeResult {
        grade,
        base_points: grade.points(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::audio::seconds_per_beat;
    use crate::game::score::RunState;
    use crate::game::world::JUDGMENT_Z;

    const SPB: f64 = 0.5217; // ~115 BPM

    #[test]
    fn on_boundary_input_is_a_zero_error_perfect() {
        for bpm in [60.0f32, 115.0, 174.0] {
            let spb = seconds_per_beat(bpm);
            for k in 0..8 {
                let error = phase_error(spb * k as f64, spb);
                assert!(error.abs() < 1e-5);
                assert_eq!(classify(error), Grade::Perfect);
            }
        }
    }

    #[test]
    fn phase_error_is_periodic() {
        for t in [0.01, 0.13, 0.4, 1.7, 23.9] {
            let a = phase_error(t, SPB);
            let b = phase_error(t + SPB, SPB);
            assert!((a - b).abs() < 1e-5);
        }
    }

    #[test]
    fn phase_error_is_symmetric_around_the_boundary() {
        let early = phase_error(3.0 * SPB - 0.05, SPB);
        let late = phase_error(3.0 * SPB + 0.05, SPB);
        assert!((early - late).abs() < 1e-5);
    }

    #[test]
    fn classification_boundaries_are_half_open() {
        assert_eq!(classify(0.0799), Grade::Perfect);
        assert_eq!(classify(0.08), Grade::Good);
        assert_eq!(classify(0.2199), Grade::Good);
        assert_eq!(classify(0.22), Grade::Miss);
        assert_eq!(classify(0.5), Grade::Miss);
    }

    fn one_target_world() -> World {
        let mut world = World::new();
        for (i, t) in world.targets.iter_mut().enumerate() {
            t.depth = JUDGMENT_Z + 10.0 + i as f32 * 400.0;
        }
        world
    }

    #[test]
    fn hit_locks_the_nearest_target_once() {
        let mut world = one_target_world();
        let id = world.targets[0].id;
        let result = judge_input(&mut world, 4.0 * SPB, SPB).unwrap();
        assert_eq!(result.grade, Grade::Perfect);
        let target = world.targets.iter().find(|t| t.id == id).unwrap();
        assert!(target.locked);
        assert_eq!(target.quality, Some(Grade::Perfect));
        assert_eq!(target.height, 1.0);
        // The locked target is terminal for judgment; the next input grabs
        // the following building.
        let next = world.nearest_unlocked_index().unwrap();
        assert_ne!(world.targets[next].id, id);
    }

    #[test]
    fn active_miss_leaves_the_target_eligible() {
        let mut world = one_target_world();
        let id = world.targets[0].id;
        let off_beat = 4.0 * SPB + 0.3 * SPB;
        let first = judge_input(&mut world, off_beat, SPB).unwrap();
        assert_eq!(first.grade, Grade::Miss);
        let again = world.nearest_unlocked_index().unwrap();
        assert_eq!(world.targets[again].id, id);
        let second = judge_input(&mut world, off_beat, SPB).unwrap();
        assert_eq!(second.grade, Grade::Miss);
    }

    #[test]
    fn judging_emits_a_feedback_token() {
        let mut world = one_target_world();
        judge_input(&mut world, 0.0, SPB).unwrap();
        assert_eq!(world.tokens.len(), 1);
        assert_eq!(world.tokens[0].text, "PERFECT");
        assert_eq!(world.tokens[0].alpha, 1.0);
    }

    #[test]
    fn empty_world_is_a_no_op() {
        let mut world = World::new();
        world.targets.clear();
        assert!(judge_input(&mut world, 0.0, SPB).is_none());
    }

    // --- End-to-end scenarios at 115 BPM ---

    #[test]
    fn on_beat_input_scores_perfect_with_multiplier_and_health() {
        let spb = seconds_per_beat(115.0);
        let mut world = one_target_world();
        let mut run = RunState::new();
        run.health = 90;
        for k in 1..=3 {
            let result = judge_input(&mut world, spb * k as f64, spb).unwrap();
            assert_eq!(result.grade, Grade::Perfect);
            run.apply_judgment(&result);
        }
        // Combo 0..4 is a x1.0 multiplier throughout.
        assert_eq!(run.score, 3000);
        assert_eq!(run.combo, 3);
        assert_eq!(run.health, 100); // 90 + 3*5, clamped
    }

    #[test]
    fn off_beat_input_is_a_miss_that_resets_combo_and_costs_health() {
        let spb = seconds_per_beat(115.0);
        // 0.15s past the boundary: progress ~0.2875, outside the GOOD window.
        let error = phase_error(7.0 * spb + 0.15, spb);
        assert!((error - 0.2875).abs() < 0.002);
        let mut world = one_target_world();
        let mut run = RunState::new();
        run.combo = 6;
        let result = judge_input(&mut world, 7.0 * spb + 0.15, spb).unwrap();
        assert_eq!(result.grade, Grade::Miss);
        let awarded = run.apply_judgment(&result);
        assert_eq!(awarded, 0);
        assert_eq!(run.combo, 0);
        assert_eq!(run.health, 85);
    }

    #[test]
    fn untouched_transit_costs_one_passive_miss() {
        let mut world = one_target_world();
        let mut run = RunState::new();
        run.combo = 9;
        let mut signals = 0;
        for _ in 0..400 {
            signals += world.advance(1.0 / 240.0, 300.0);
        }
        assert!(signals >= 1);
        for _ in 0..signals {
            run.apply_passive_miss();
        }
        assert_eq!(run.combo, 0);
        assert_eq!(run.health, 100 - 10 * signals as i32);
    }
}
