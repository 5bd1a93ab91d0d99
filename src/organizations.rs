//! Organizations
//!
//! Membership source for the access resolver; two people sharing an
//! organization may view each other's links.

use chrono::naive::NaiveDateTime;

/// A named group of people
#[derive(Clone, Debug)]
pub struct Organization {
    /// Unique name
    pub name: String,

    /// All members
    pub members: Vec<Member>,

    /// Creation date
    pub created_at: NaiveDateTime,
}

impl Organization {
    /// Is this person a member?
    pub fn has_member(&self, username: &str) -> bool {
        self.members.iter().any(|member| member.username == username)
    }

    /// Is this person an administrator of the organization?
    pub fn has_admin(&self, username: &str) -> bool {
        self.members
            .iter()
            .any(|member| member.username == username && member.is_admin)
    }
}

/// A single organization membership
#[derive(Clone, Debug)]
pub struct Member {
    /// Member username
    pub username: String,

    /// May manage the organization itself
    pub is_admin: bool,

    /// When the membership started
    pub joined_at: NaiveDateTime,
}
