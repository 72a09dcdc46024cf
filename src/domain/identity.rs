/// Author identity extracted from a post. Every field is optional because the
/// forum markup only ever exposes some of them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    pub name: Option<String>,
    pub login: Option<String>,
    pub slug: Option<String>,
    pub href: Option<String>,
}

impl Identity {
    pub fn from_slug(slug: impl Into<String>) -> Self {
        Self {
            slug: Some(slug.into()),
            ..Self::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.fields().next().is_none()
    }

    /// All distinct normalized values, in field order.
    pub fn candidates(&self) -> Vec<String> {
        let mut out: Vec<String> = Vec::with_capacity(4);
        for value in self.fields().filter_map(normalize) {
            if !out.contains(&value) {
                out.push(value);
            }
        }
        out
    }

    /// Human readable label for logs.
    pub fn label(&self) -> &str {
        self.fields().next().unwrap_or("-")
    }

    fn fields(&self) -> impl Iterator<Item = &str> {
        [&self.name, &self.login, &self.slug, &self.href]
            .into_iter()
            .flatten()
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

pub fn normalize(value: &str) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_lowercase())
    }
}
