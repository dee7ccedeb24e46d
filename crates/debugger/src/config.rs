use crate::text::TOO_BIG;

#[derive(Clone, Debug)]
pub struct Config {
    /// Modules with more bytecode than this are not disassembled.
    pub text_size_limit: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            text_size_limit: TOO_BIG,
        }
    }
}

impl Config {
    pub fn text_size_limit(mut self, limit: usize) -> Self {
        self.text_size_limit = limit;
        self
    }
}
