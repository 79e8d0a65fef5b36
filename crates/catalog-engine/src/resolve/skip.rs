use crate::levels::ConfigResolver;

/// Whether every level strictly between `parent_level` and `child_level` may
/// be bypassed when it produced no items. Only virtual, pseudo-parent and
/// optional levels can be; any other level in between is a real gap in the
/// data and must stay visible.
pub fn can_skip_virtual_level(parent_level: &str, child_level: &str, levels: &ConfigResolver) -> bool {
    let (Some(parent), Some(child)) = (levels.level_depth(parent_level), levels.level_depth(child_level)) else {
        return false;
    };
    if child <= parent {
        return false;
    }
    (parent + 1..child).all(|depth| {
        levels
            .config_at(depth)
            .is_some_and(|config| config.is_skippable())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::volume::LevelConfig;

    fn resolver() -> ConfigResolver {
        let virtual_level = LevelConfig {
            is_virtual: true,
            ..LevelConfig::default()
        };
        let optional = LevelConfig {
            is_optional: true,
            ..LevelConfig::default()
        };
        ConfigResolver::new(
            vec![
                ("market".to_string(), LevelConfig::default()),
                ("region".to_string(), virtual_level),
                ("country".to_string(), LevelConfig::default()),
                ("series".to_string(), optional),
                ("model".to_string(), LevelConfig::default()),
            ],
            None,
        )
        .expect("resolver")
    }

    #[test]
    fn adjacent_levels_need_nothing_skipped() {
        assert!(can_skip_virtual_level("market", "region", &resolver()));
    }

    #[test]
    fn virtual_and_optional_levels_can_be_bypassed() {
        let levels = resolver();
        assert!(can_skip_virtual_level("market", "country", &levels));
        assert!(can_skip_virtual_level("country", "model", &levels));
    }

    #[test]
    fn real_levels_are_never_hidden() {
        let levels = resolver();
        assert!(!can_skip_virtual_level("market", "model", &levels));
        assert!(!can_skip_virtual_level("model", "market", &levels));
        assert!(!can_skip_virtual_level("market", "engine", &levels));
    }
}
