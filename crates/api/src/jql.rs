/// Builds JQL search queries from typed filter parameters.
#[derive(Debug, Default, Clone)]
pub struct JqlBuilder {
    conditions: Vec<String>,
    order_by: Option<(String, bool)>,
}

impl JqlBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// `field = value`. `@me` on user fields becomes `currentUser()`.
    pub fn eq(mut self, field: &str, value: &str) -> Self {
        let value = Self::normalize_value(field, value);
        self.conditions.push(format!("{field} = {value}"));
        self
    }

    /// `field IN (...)`; an empty list adds nothing.
    pub fn in_list<S: AsRef<str>>(mut self, field: &str, values: &[S]) -> Self {
        if values.is_empty() {
            return self;
        }

        let quoted: Vec<String> = values
            .iter()
            .map(|v| Self::escape_and_quote(v.as_ref()))
            .collect();
        self.conditions
            .push(format!("{field} IN ({})", quoted.join(", ")));
        self
    }

    /// Text search, `field ~ "value"`.
    pub fn contains(mut self, field: &str, value: &str) -> Self {
        let quoted = Self::escape_and_quote(value);
        self.conditions.push(format!("{field} ~ {quoted}"));
        self
    }

    pub fn order_by(mut self, field: &str, descending: bool) -> Self {
        self.order_by = Some((field.to_string(), descending));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn finish(self) -> String {
        let mut query = self.conditions.join(" AND ");

        if let Some((field, descending)) = self.order_by {
            if !query.is_empty() {
                query.push(' ');
            }
            query.push_str(&format!(
                "ORDER BY {field} {}",
                if descending { "DESC" } else { "ASC" }
            ));
        }

        query
    }

    fn escape_and_quote(value: &str) -> String {
        // Backslashes first so the quote escapes survive.
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        format!("\"{escaped}\"")
    }

    fn normalize_value(field: &str, value: &str) -> String {
        match (field, value) {
            ("assignee" | "reporter" | "creator" | "watcher", "@me") => "currentUser()".to_string(),
            (_, "unassigned" | "none" | "empty") => "EMPTY".to_string(),
            _ => Self::escape_and_quote(value),
        }
    }
}
