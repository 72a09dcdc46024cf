use std::fmt;

/// Ordered list of inline CSS declarations from a `style` attribute.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InlineStyle {
    declarations: Vec<(String, String)>,
}

impl InlineStyle {
    pub fn parse(source: &str) -> Self {
        let declarations = source
            .split(';')
            .filter_map(|part| part.split_once(':'))
            .map(|(property, value)| (property.trim().to_ascii_lowercase(), value.trim().to_string()))
            .filter(|(property, value)| !property.is_empty() && !value.is_empty())
            .collect();
        Self { declarations }
    }

    pub fn get(&self, property: &str) -> Option<&str> {
        self.declarations
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(property))
            .map(|(_, value)| value.as_str())
    }

    /// Returns `true` when the declaration list changed.
    pub fn set(&mut self, property: &str, value: &str) -> bool {
        match self
            .declarations
            .iter_mut()
            .find(|(name, _)| name.eq_ignore_ascii_case(property))
        {
            Some((_, current)) if current == value => false,
            Some((_, current)) => {
                *current = value.to_string();
                true
            }
            None => {
                self.declarations
                    .push((property.to_ascii_lowercase(), value.to_string()));
                true
            }
        }
    }

    pub fn remove(&mut self, property: &str) -> bool {
        let before = self.declarations.len();
        self.declarations
            .retain(|(name, _)| !name.eq_ignore_ascii_case(property));
        before != self.declarations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.declarations.is_empty()
    }
}

impl fmt::Display for InlineStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (idx, (property, value)) in self.declarations.iter().enumerate() {
            if idx > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{property}: {value};")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_and_edit_round_trip() {
        let mut style = InlineStyle::parse("color: red;  DISPLAY:block ; broken; margin:");
        assert_eq!(style.get("display"), Some("block"));
        assert!(style.set("display", "none"));
        assert!(!style.set("display", "none"));
        assert!(style.set("opacity", "0.1"));
        assert_eq!(style.to_string(), "color: red; display: none; opacity: 0.1;");
        assert!(style.remove("color"));
        assert!(!style.remove("color"));
        assert_eq!(style.to_string(), "display: none; opacity: 0.1;");
    }
}
