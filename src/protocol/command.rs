/// Commands accepted by the controller when no whitelist is configured.
pub const DEFAULT_COMMANDS: [&str; 4] = ["UP", "DOWN", "LEFT", "RIGHT"];

/// Strip the space/tab padding from a fixed-width command field
pub fn trim_command(raw: &str) -> &str {
    raw.trim_matches(|c| c == ' ' || c == '\t')
}

/// Whitelist of commands the controller will execute.
#[derive(Debug, Clone)]
pub struct CommandSet {
    commands: Vec<String>,
}

impl CommandSet {
    pub fn new(commands: Vec<String>) -> Self {
        Self { commands }
    }

    /// Check a trimmed command against the whitelist
    pub fn is_supported(&self, command: &str) -> bool {
        self.commands.iter().any(|c| c == command)
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}

impl Default for CommandSet {
    fn default() -> Self {
        Self::new(DEFAULT_COMMANDS.iter().map(|c| c.to_string()).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_padding_from_both_ends() {
        assert_eq!(trim_command("UP     "), "UP");
        assert_eq!(trim_command("  DOWN "), "DOWN");
        assert_eq!(trim_command("\tLEFT\t"), "LEFT");
    }

    #[test]
    fn trim_preserves_interior_whitespace() {
        assert_eq!(trim_command(" GO UP "), "GO UP");
    }

    #[test]
    fn default_set_matches_controller_commands() {
        let set = CommandSet::default();
        assert!(set.is_supported("UP"));
        assert!(set.is_supported("RIGHT"));
        assert!(!set.is_supported("FOO"));
        assert!(!set.is_supported("up"));
    }
}
