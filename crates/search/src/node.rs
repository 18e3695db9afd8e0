use std::fmt;
use std::sync::Arc;

/// A partial solution: an immutable chain of step strings.
///
/// Extending a thought allocates a new link that points at its parent, so
/// frontier members that share a prefix share its storage. The concatenated
/// text is materialized once per link.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct Thought(Option<Arc<ThoughtLink>>);

#[derive(PartialEq, Eq, Hash)]
struct ThoughtLink {
    parent: Thought,
    step: String,
    depth: usize,
    text: String,
}

impl Thought {
    /// The empty thought every search starts from.
    pub fn root() -> Self {
        Self(None)
    }

    /// A new thought with `step` appended verbatim.
    pub fn extend(&self, step: &str) -> Self {
        let mut text = String::with_capacity(self.text().len() + step.len());
        text.push_str(self.text());
        text.push_str(step);
        Self(Some(Arc::new(ThoughtLink {
            parent: self.clone(),
            step: step.to_string(),
            depth: self.depth() + 1,
            text,
        })))
    }

    /// Concatenation of every step from the root.
    pub fn text(&self) -> &str {
        self.0.as_ref().map_or("", |link| link.text.as_str())
    }

    /// Number of steps appended since the root.
    pub fn depth(&self) -> usize {
        self.0.as_ref().map_or(0, |link| link.depth)
    }

    /// The thought this one was extended from, `None` for the root.
    pub fn parent(&self) -> Option<&Thought> {
        self.0.as_ref().map(|link| &link.parent)
    }

    /// Steps from root to this thought, in order.
    pub fn steps(&self) -> Vec<&str> {
        let mut steps = Vec::with_capacity(self.depth());
        let mut current = self;
        while let Some(link) = current.0.as_ref() {
            steps.push(link.step.as_str());
            current = &link.parent;
        }
        steps.reverse();
        steps
    }
}

impl fmt::Debug for Thought {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thought")
            .field("depth", &self.depth())
            .field("text", &self.text())
            .finish()
    }
}

/// A thought produced by expanding a frontier member during one step.
#[derive(Debug, Clone)]
pub struct Candidate {
    /// The expanded thought.
    pub thought: Thought,
    /// Index of the frontier member it came from.
    pub parent_index: usize,
    /// Step in which it was produced.
    pub step: usize,
    /// Score once evaluated.
    pub score: Option<f64>,
}

impl Candidate {
    /// An unscored candidate.
    pub fn new(thought: Thought, parent_index: usize, step: usize) -> Self {
        Self {
            thought,
            parent_index,
            step,
            score: None,
        }
    }

    /// Full candidate text.
    pub fn text(&self) -> &str {
        self.thought.text()
    }
}
