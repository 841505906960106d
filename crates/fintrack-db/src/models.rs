/// Database row types — these map directly to SQLite rows.
/// Distinct from the fintrack-types API models so that the password hash
/// and refresh token never leak into a response shape by accident.

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub fullname: String,
    pub password: String,
    /// Single active refresh token; NULL when logged out.
    pub refresh_token: Option<String>,
    pub created_at: String,
}
