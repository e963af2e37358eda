use rand::Rng;
use shared::PlayerId;

/// Lowest value of any color channel, keeps players visible on a dark field.
const MIN_COLOR_CHANNEL: f32 = 0.2;

/// One participant as tracked by the authoritative game state.
#[derive(Debug, Clone, PartialEq)]
pub struct Player {
    pub id: PlayerId,
    pub position: (f32, f32),
    pub alive: bool,
    pub ready: bool,
    pub color: (f32, f32, f32),
}

impl Player {
    pub fn new(id: PlayerId, color: (f32, f32, f32)) -> Self {
        Player {
            id,
            position: (0.0, 0.0),
            alive: true,
            ready: false,
            color,
        }
    }
}

// Random color with every channel in [MIN_COLOR_CHANNEL, 1.0]
pub fn generate_color<R: Rng + ?Sized>(rng: &mut R) -> (f32, f32, f32) {
    (
        rng.gen_range(MIN_COLOR_CHANNEL..=1.0),
        rng.gen_range(MIN_COLOR_CHANNEL..=1.0),
        rng.gen_range(MIN_COLOR_CHANNEL..=1.0),
    )
}
