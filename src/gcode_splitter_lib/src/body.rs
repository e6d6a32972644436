use once_cell::sync::Lazy;
use regex::bytes::Regex;

static END_PREFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^; END_PREFIX").unwrap());
static START_POSTFIX: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)^; START_POSTFIX").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyState {
    /// Annotated prefix/postfix lines; never written, never checked for moves.
    InBoilerplate,
    InBody,
}

/// What a `; START_POSTFIX` line in the stream does to the body state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PostfixMarker {
    /// Leave the body; everything up to the next `; END_PREFIX` is boilerplate.
    #[default]
    EndsBody,
    /// Treated like any other line, so once in the body we stay there.
    Ignored,
}

/// Transition table:
///
/// | line                 | from          | to            |
/// |----------------------|---------------|---------------|
/// | `; END_PREFIX...`    | any           | InBody        |
/// | `; START_POSTFIX...` | any           | InBoilerplate (only with `PostfixMarker::EndsBody`) |
/// | anything else        | s             | s             |
#[derive(Debug, Clone)]
pub struct BodyTracker {
    state: BodyState,
    postfix_marker: PostfixMarker,
}

impl BodyTracker {
    /// Starts out skipping boilerplate only if there's a non-empty prefix to skip.
    pub fn new(prefix: Option<&[u8]>, postfix_marker: PostfixMarker) -> BodyTracker {
        let state = match prefix {
            Some(p) if !p.is_empty() => BodyState::InBoilerplate,
            _ => BodyState::InBody,
        };
        log::debug!("body tracker starting state: {:?}", state);
        BodyTracker { state, postfix_marker }
    }

    pub fn state(&self) -> BodyState {
        self.state
    }

    /// Classifies `line`, updating the state first.
    pub fn observe(&mut self, line: &[u8]) -> BodyState {
        if END_PREFIX.is_match(line) {
            self.transition(BodyState::InBody, "end of prefix");
        }
        if self.postfix_marker == PostfixMarker::EndsBody && START_POSTFIX.is_match(line) {
            self.transition(BodyState::InBoilerplate, "start of postfix");
        }
        self.state
    }

    fn transition(&mut self, to: BodyState, why: &str) {
        log::debug!("{}: {:?} -> {:?}", why, self.state, to);
        self.state = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::BodyState::{InBody as B, InBoilerplate as P};

    fn classify(tracker: &mut BodyTracker, text: &str) -> Vec<BodyState> {
        text.lines().map(|line| tracker.observe(line.as_bytes())).collect()
    }

    #[test]
    fn initial_state_depends_on_prefix() {
        assert_eq!(BodyTracker::new(None, PostfixMarker::EndsBody).state(), B);
        assert_eq!(BodyTracker::new(Some(&b""[..]), PostfixMarker::EndsBody).state(), B);
        assert_eq!(BodyTracker::new(Some(&b"G28\n"[..]), PostfixMarker::EndsBody).state(), P);
    }

    #[test]
    fn walks_prefix_body_postfix() {
        let mut t = BodyTracker::new(Some(&b"; START_PREFIX\n; END_PREFIX\n"[..]), PostfixMarker::EndsBody);
        let text = "; START_PREFIX\nG28\n; END_PREFIX\nG1 Z1\n; START_POSTFIX\nM84\n; END_POSTFIX\n";
        assert_eq!(classify(&mut t, text), vec![P, P, B, B, P, P, P]);
    }

    #[test]
    fn ignored_postfix_marker_stays_in_body() {
        let mut t = BodyTracker::new(Some(&b"x"[..]), PostfixMarker::Ignored);
        let text = "G28\n; end_prefix\nG1 Z1\n; START_POSTFIX\nM84\n";
        assert_eq!(classify(&mut t, text), vec![P, B, B, B, B]);
    }

    #[test]
    fn markers_flip_state_from_either_side() {
        let mut t = BodyTracker::new(None, PostfixMarker::EndsBody);
        let text = "G1 Z1\n; start_postfix\nM84\n; END_PREFIX\nG1 Z2\n";
        assert_eq!(classify(&mut t, text), vec![B, P, P, B, B]);
    }

    #[test]
    fn markers_must_start_the_line() {
        let mut t = BodyTracker::new(None, PostfixMarker::EndsBody);
        let text = "G1 Z1 ; START_POSTFIX\n ; START_POSTFIX\n";
        assert_eq!(classify(&mut t, text), vec![B, B]);
    }

    #[test]
    fn markers_match_on_lines_that_are_not_utf8() {
        let mut t = BodyTracker::new(Some(&b"G28\n"[..]), PostfixMarker::EndsBody);
        assert_eq!(t.observe(b"M117 pr\xe9chauffe\n"), P);
        assert_eq!(t.observe(b"; END_PREFIX \xff\n"), B);
        assert_eq!(t.observe(b"; START_POSTFIX caf\xe9\n"), P);
    }
}
