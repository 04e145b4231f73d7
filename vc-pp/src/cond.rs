//! Conditional-compilation stack (spec §3 "Conditional frame", §4.6).

/// One `#if`/`#ifdef`/`#ifndef` frame.
#[derive(Debug, Clone, Copy)]
pub struct ConditionalFrame {
    /// Whether the enclosing stack was fully active when this frame was
    /// pushed.
    pub parent_active: bool,
    /// Whether this branch is currently emitting.
    pub taking: bool,
    /// Whether any branch of this `#if` chain has matched yet.
    pub taken: bool,
    /// Source line of the opening directive, for unterminated-conditional
    /// diagnostics.
    pub origin_line: usize,
}

/// Tracks nested `#if` state for one translation unit.
#[derive(Debug, Default)]
pub struct ConditionalStack {
    frames: Vec<ConditionalFrame>,
}

impl ConditionalStack {
    pub fn new() -> Self {
        Self::default()
    }

    /// A stack is fully active iff every frame is `taking`.
    pub fn is_active(&self) -> bool {
        self.frames.iter().all(|f| f.taking)
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    /// The innermost open frame, if any.
    pub fn top(&self) -> Option<ConditionalFrame> {
        self.frames.last().copied()
    }

    /// Push a frame for `#if`/`#ifdef`/`#ifndef`.
    pub fn push_if(&mut self, condition_true: bool, origin_line: usize) {
        let parent_active = self.is_active();
        let taking = parent_active && condition_true;
        self.frames.push(ConditionalFrame {
            parent_active,
            taking,
            taken: taking,
            origin_line,
        });
    }

    /// `#elif expr`. Returns `false` only when there is no open frame at
    /// all — callers should treat that as a "stray `#elif`" syntax error.
    /// A frame whose `parent_active` is false is a perfectly ordinary
    /// `#elif`/`#else` nested inside an outer not-taken branch; it is
    /// accepted as a no-op (the frame's `taking`/`taken` are already
    /// false from `push_if` and stay that way) rather than treated as an
    /// error.
    pub fn elif(&mut self, condition_true: impl FnOnce() -> bool) -> bool {
        let Some(frame) = self.frames.last_mut() else {
            return false;
        };
        if !frame.parent_active {
            return true;
        }
        if frame.taken {
            frame.taking = false;
        } else if condition_true() {
            frame.taking = true;
            frame.taken = true;
        } else {
            frame.taking = false;
        }
        true
    }

    /// `#else`, equivalent to `#elif !taken`.
    pub fn else_branch(&mut self) -> bool {
        self.elif(|| true)
    }

    /// `#endif`. Returns the popped frame, or `None` for a stray `#endif`.
    pub fn endif(&mut self) -> Option<ConditionalFrame> {
        self.frames.pop()
    }

    /// The origin line of every still-open frame, oldest first — used to
    /// report unterminated conditionals at end-of-file.
    pub fn unterminated(&self) -> Vec<usize> {
        self.frames.iter().map(|f| f.origin_line).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn simple_if_true() {
        let mut stack = ConditionalStack::new();
        stack.push_if(true, 1);
        assert!(stack.is_active());
        stack.endif();
        assert!(stack.is_active());
        assert_eq!(stack.depth(), 0);
    }

    #[test]
    fn if_false_suppresses_elif_and_else() {
        let mut stack = ConditionalStack::new();
        stack.push_if(false, 1);
        assert!(!stack.is_active());
        assert!(stack.elif(|| true));
        assert!(stack.is_active());
        stack.endif();
    }

    #[test]
    fn taken_suppresses_later_branches() {
        let mut stack = ConditionalStack::new();
        stack.push_if(true, 1);
        assert!(stack.is_active());
        stack.elif(|| true);
        assert!(!stack.is_active(), "first branch already taken");
        stack.else_branch();
        assert!(!stack.is_active());
    }

    #[test]
    fn nested_inherits_parent_inactive() {
        let mut stack = ConditionalStack::new();
        stack.push_if(false, 1);
        stack.push_if(true, 2);
        assert!(!stack.is_active(), "parent inactive forces child inactive");
    }

    #[test]
    fn round_trip_restores_state() {
        let mut stack = ConditionalStack::new();
        stack.push_if(true, 1);
        let before = stack.is_active();
        stack.push_if(true, 2);
        stack.endif();
        assert_eq!(stack.is_active(), before);
        assert_eq!(stack.depth(), 1);
    }

    #[test]
    fn unterminated_reports_origin_lines() {
        let mut stack = ConditionalStack::new();
        stack.push_if(true, 5);
        stack.push_if(true, 9);
        assert_eq!(stack.unterminated(), vec![5, 9]);
    }

    #[test]
    fn stray_endif_returns_none() {
        let mut stack = ConditionalStack::new();
        assert!(stack.endif().is_none());
    }

    #[test]
    fn elif_and_else_nested_in_a_not_taken_branch_are_not_stray() {
        // #if 1 ... #else ... #ifdef X ... #else ... #endif #endif
        let mut stack = ConditionalStack::new();
        stack.push_if(true, 1);
        assert!(stack.else_branch(), "outer #else: ordinary, not stray");
        assert!(!stack.is_active(), "outer #if already taken, #else not active");
        stack.push_if(false, 2);
        assert!(
            stack.else_branch(),
            "inner #else nested in the outer's not-taken branch must not be stray"
        );
        assert!(!stack.is_active());
        stack.endif();
        stack.endif();
        assert!(stack.is_active());
        assert_eq!(stack.depth(), 0);
    }
}
