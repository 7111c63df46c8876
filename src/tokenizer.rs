/// Splits masked lines into tokens on whitespace plus optional extra delimiters.
#[derive(Debug, Clone, Default)]
pub struct Tokenizer {
    extra_delimiters: Vec<String>,
}

impl Tokenizer {
    pub fn new(extra_delimiters: Vec<String>) -> Self {
        Self { extra_delimiters: extra_delimiters.into_iter().filter(|d| !d.is_empty()).collect() }
    }

    pub fn extra_delimiters(&self) -> &[String] {
        &self.extra_delimiters
    }

    /// An empty or all-whitespace line yields no tokens.
    pub fn tokenize(&self, line: &str) -> Vec<String> {
        if self.extra_delimiters.is_empty() {
            return line.split_whitespace().map(str::to_owned).collect();
        }
        let mut content = line.trim().to_string();
        for delimiter in &self.extra_delimiters {
            content = content.replace(delimiter.as_str(), " ");
        }
        content.split_whitespace().map(str::to_owned).collect()
    }
}
