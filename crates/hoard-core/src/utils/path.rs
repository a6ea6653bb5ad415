//! Checks applied before asset names are used as file names outside the pool.

use std::path::{Component, Path};

/// Check that a name is a single plain file name component
pub fn is_safe_file_name(name: &str) -> bool {
    let mut components = Path::new(name).components();
    matches!(
        (components.next(), components.next()),
        (Some(Component::Normal(_)), None)
    ) && !name.contains(['/', '\\'])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_safe_file_name() {
        assert!(is_safe_file_name("firmware-1.2.bin"));
        assert!(is_safe_file_name("intro.mp4"));
        assert!(!is_safe_file_name(""));
        assert!(!is_safe_file_name("."));
        assert!(!is_safe_file_name(".."));
        assert!(!is_safe_file_name("media/intro.mp4"));
        assert!(!is_safe_file_name("/etc/passwd"));
        assert!(!is_safe_file_name("..\\evil"));
    }
}
