use splitledger_core::UserId;

/// Authenticated caller of a request.
///
/// Inserted by the auth middleware once the bearer token resolved to a
/// registered user; every protected route reads it.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct CallerContext {
    user_id: UserId,
}

impl CallerContext {
    pub fn new(user_id: UserId) -> Self {
        Self { user_id }
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }
}
