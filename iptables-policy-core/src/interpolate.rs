use crate::primitives::{PrimitiveError, Primitives, Substitution};

/// Expands `<% path %>` placeholders against a [`Primitives`] tree.
pub struct Interpolations<'a> {
    primitives: &'a Primitives,
}

struct Placeholder<'a> {
    before: &'a str,
    identifier: &'a str,
    after: &'a str,
}

impl<'a> Interpolations<'a> {
    pub fn new(primitives: &'a Primitives) -> Self {
        Self { primitives }
    }

    /// Expand a template into one fully-substituted string per branch.
    ///
    /// A scalar substitution splices in place and expansion continues on the
    /// resulting string; a list substitution forks one branch per element,
    /// each branch expanded independently, so successive list placeholders
    /// multiply out in order.
    pub fn expand(&self, template: &str) -> Result<Vec<String>, PrimitiveError> {
        let Some(found) = find_placeholder(template) else {
            return Ok(vec![template.to_string()]);
        };

        match self.primitives.substitute(found.identifier)? {
            Substitution::Scalar(value) => {
                self.expand(&format!("{}{}{}", found.before, value, found.after))
            }
            Substitution::List(values) => {
                let mut expanded = Vec::new();
                for value in values {
                    let spliced = format!("{}{}{}", found.before, value, found.after);
                    expanded.extend(self.expand(&spliced)?);
                }
                Ok(expanded)
            }
        }
    }
}

fn find_placeholder(template: &str) -> Option<Placeholder<'_>> {
    let start = template.find("<%")?;
    let rest = &template[start + 2..];
    let end = rest.find("%>")?;
    let identifier = rest[..end].trim();
    if identifier.is_empty() || identifier.contains(char::is_whitespace) {
        return None;
    }
    Some(Placeholder {
        before: &template[..start],
        identifier,
        after: &rest[end + 2..],
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::Interpolations;
    use crate::primitives::Primitives;

    fn primitives() -> Primitives {
        Primitives::from_value(&json!({
            "array1": ["v1", "v2"],
            "branch": {"leaf1": "leaf1_value"},
            "pair": ["a", "b"],
        }))
        .expect("tree should build")
    }

    #[test]
    fn plain_strings_pass_through() {
        let primitives = primitives();
        let interpolations = Interpolations::new(&primitives);

        assert_eq!(
            interpolations.expand("-j ACCEPT").expect("expand"),
            vec!["-j ACCEPT".to_string()]
        );
    }

    #[test]
    fn scalar_placeholder_splices_once() {
        let primitives = primitives();
        let interpolations = Interpolations::new(&primitives);

        assert_eq!(
            interpolations.expand("-j <% branch.leaf1 %>").expect("expand"),
            vec!["-j leaf1_value".to_string()]
        );
    }

    #[test]
    fn list_placeholder_fans_out_preserving_surroundings() {
        let primitives = primitives();
        let interpolations = Interpolations::new(&primitives);

        assert_eq!(
            interpolations
                .expand("before <% array1 %> after")
                .expect("expand"),
            vec!["before v1 after".to_string(), "before v2 after".to_string()]
        );
    }

    #[test]
    fn successive_list_placeholders_multiply_out() {
        let primitives = primitives();
        let interpolations = Interpolations::new(&primitives);

        assert_eq!(
            interpolations
                .expand("<% array1 %>:<% pair %>")
                .expect("expand"),
            vec![
                "v1:a".to_string(),
                "v1:b".to_string(),
                "v2:a".to_string(),
                "v2:b".to_string(),
            ]
        );
    }

    #[test]
    fn unknown_identifier_fails() {
        let primitives = primitives();
        let interpolations = Interpolations::new(&primitives);

        assert!(interpolations.expand("-j <% nope %>").is_err());
    }
}
