pub mod esg;
pub mod portfolio;

/// Outcome of validating an untyped upstream payload at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Parsed<T> {
    Ok(T),
    Malformed(String),
}

impl<T> Parsed<T> {
    pub fn ok(self) -> Option<T> {
        match self {
            Parsed::Ok(v) => Some(v),
            Parsed::Malformed(_) => None,
        }
    }

    pub fn into_result(self) -> anyhow::Result<T> {
        match self {
            Parsed::Ok(v) => Ok(v),
            Parsed::Malformed(reason) => Err(anyhow::anyhow!("malformed payload: {reason}")),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Parsed<U> {
        match self {
            Parsed::Ok(v) => Parsed::Ok(f(v)),
            Parsed::Malformed(reason) => Parsed::Malformed(reason),
        }
    }
}
