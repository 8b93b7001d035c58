#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BindError {
    #[error("Check '{check}': no sprite matches '{pattern}'")]
    SpriteNotFound { check: String, pattern: String },

    #[error("Check '{check}': sprite '{sprite}' has no variable matching '{pattern}'")]
    VariableNotFound {
        check: String,
        sprite: String,
        pattern: String,
    },

    #[error("Check '{check}': unknown attribute '{name}'")]
    UnknownAttribute { check: String, name: String },

    #[error("Check '{check}': sprite '{sprite}' has neither attribute nor variable '{member}'")]
    MemberNotFound {
        check: String,
        sprite: String,
        member: String,
    },

    #[error("Check '{check}': unknown comparison operator '{op}'")]
    UnknownComparison { check: String, op: String },

    #[error("Check '{check}': unknown change '{change}'")]
    UnknownChange { check: String, change: String },

    #[error("Check '{check}': colour component '{value}' is not in 0..=255")]
    ColorOutOfRange { check: String, value: String },

    #[error("Check '{check}': '{value}' is not a valid {what}")]
    InvalidNumber {
        check: String,
        value: String,
        what: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EvalError {
    #[error("'{value}' is not a number")]
    NotNumeric { value: String },

    #[error("sprite '{sprite}' no longer exists")]
    SpriteGone { sprite: String },

    #[error("variable '{sprite}.{variable}' no longer exists")]
    VariableGone { sprite: String, variable: String },
}
