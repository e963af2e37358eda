//! Terminal input mapping
//!
//! Turns what the user types into protocol requests. Single keys mirror the
//! keyboard controls of the graphical client; full protocol lines are passed
//! through unchanged.

use shared::ClientRequest;

/// Distance covered by one arrow-key move
pub const MOVE_STEP: f32 = 0.1;

/// Maps one line of user input to a request, or `None` if it means nothing.
///
/// Arrow words keep the graphical client's axis mapping: up/down move along
/// x, left/right along y.
pub fn parse_input(input: &str) -> Option<ClientRequest> {
    let trimmed = input.trim();
    let mut words = trimmed.split_whitespace();
    let first = words.next()?.to_ascii_lowercase();

    let request = match first.as_str() {
        "s" | "start" => ClientRequest::Start,
        "p" | "pause" => ClientRequest::TogglePause,
        "q" | "quit" | "esc" => ClientRequest::Quit,
        "up" => ClientRequest::Move { dx: MOVE_STEP, dy: 0.0 },
        "down" => ClientRequest::Move { dx: -MOVE_STEP, dy: 0.0 },
        "left" => ClientRequest::Move { dx: 0.0, dy: -MOVE_STEP },
        "right" => ClientRequest::Move { dx: 0.0, dy: MOVE_STEP },
        "move" | "m" => {
            let dx = words.next()?.parse::<f32>().ok()?;
            let dy = words.next()?.parse::<f32>().ok()?;
            if words.next().is_some() || !dx.is_finite() || !dy.is_finite() {
                return None;
            }
            ClientRequest::Move { dx, dy }
        }
        _ => return trimmed.parse().ok(),
    };

    Some(request)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keys() {
        assert_eq!(parse_input("s"), Some(ClientRequest::Start));
        assert_eq!(parse_input("Pause\n"), Some(ClientRequest::TogglePause));
        assert_eq!(parse_input("q"), Some(ClientRequest::Quit));
    }

    #[test]
    fn test_arrow_words() {
        assert_eq!(
            parse_input("up"),
            Some(ClientRequest::Move { dx: MOVE_STEP, dy: 0.0 })
        );
        assert_eq!(
            parse_input("left"),
            Some(ClientRequest::Move { dx: 0.0, dy: -MOVE_STEP })
        );
    }

    #[test]
    fn test_explicit_move() {
        assert_eq!(
            parse_input("move 0.25 -0.5"),
            Some(ClientRequest::Move { dx: 0.25, dy: -0.5 })
        );
        assert_eq!(parse_input("move 0.25"), None);
        assert_eq!(parse_input("move 0.25 0.1 9"), None);
        assert_eq!(parse_input("move inf 0.0"), None);
    }

    #[test]
    fn test_protocol_passthrough() {
        assert_eq!(
            parse_input("CLT_REQ_MOVE 0.5 0.0"),
            Some(ClientRequest::Move { dx: 0.5, dy: 0.0 })
        );
        assert_eq!(parse_input("CLT_REQ_TOGGLE_PAUSE"), Some(ClientRequest::TogglePause));
        assert_eq!(parse_input("jump"), None);
        assert_eq!(parse_input("   "), None);
    }
}
