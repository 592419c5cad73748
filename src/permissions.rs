//! Authorization decisions.
//!
//! Every controller asks [`decide`] before touching the store. The function is
//! pure: the verdict depends only on the actor handed in and the action being
//! attempted, and resources that have an owner carry that owner inside the
//! action itself. Adding a variant to any action enum fails to compile until a
//! rule is written for it here.

use crate::auth::Actor;

/// Actions on Articles. Owner-checked actions carry the article's owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArticleAction {
    List,
    Retrieve,
    Create,
    Update { owner_id: i64 },
    PartialUpdate { owner_id: i64 },
    Destroy { owner_id: i64 },
    Publish,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TopicAction {
    List,
    Retrieve,
    Create,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UserAction {
    Retrieve,
    Register,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Article(ArticleAction),
    Topic(TopicAction),
    User(UserAction),
}

/// Why a request was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Denial {
    /// No credentials were presented (maps to 401).
    NotAuthenticated,
    /// Credentials were presented but do not grant the action (maps to 403).
    Forbidden,
}

impl Denial {
    pub fn reason(&self) -> &'static str {
        match self {
            Denial::NotAuthenticated => "not_authenticated",
            Denial::Forbidden => "forbidden",
        }
    }
}

pub type Decision = Result<(), Denial>;

/// decide
///
/// | Resource | Action | Rule |
/// |---|---|---|
/// | Article | list, retrieve | anyone |
/// | Article | create | authenticated |
/// | Article | update, partial update, destroy | staff or owner |
/// | Article | publish | staff |
/// | Topic | list, retrieve | anyone |
/// | Topic | create | staff |
/// | User | retrieve, register | anyone |
pub fn decide(actor: &Actor, action: Action) -> Decision {
    match action {
        Action::Article(action) => decide_article(actor, action),
        Action::Topic(action) => decide_topic(actor, action),
        // Profiles are public, including each user's article list.
        Action::User(UserAction::Retrieve | UserAction::Register) => Ok(()),
    }
}

fn decide_article(actor: &Actor, action: ArticleAction) -> Decision {
    match action {
        ArticleAction::List | ArticleAction::Retrieve => Ok(()),
        ArticleAction::Create => authenticated(actor),
        ArticleAction::Update { owner_id }
        | ArticleAction::PartialUpdate { owner_id }
        | ArticleAction::Destroy { owner_id } => owner_or_staff(actor, owner_id),
        ArticleAction::Publish => staff(actor),
    }
}

fn decide_topic(actor: &Actor, action: TopicAction) -> Decision {
    match action {
        TopicAction::List | TopicAction::Retrieve => Ok(()),
        TopicAction::Create => staff(actor),
    }
}

fn authenticated(actor: &Actor) -> Decision {
    match actor {
        Actor::Anonymous => Err(Denial::NotAuthenticated),
        Actor::User(_) => Ok(()),
    }
}

fn staff(actor: &Actor) -> Decision {
    match actor {
        Actor::Anonymous => Err(Denial::NotAuthenticated),
        Actor::User(user) if user.is_staff => Ok(()),
        Actor::User(_) => Err(Denial::Forbidden),
    }
}

fn owner_or_staff(actor: &Actor, owner_id: i64) -> Decision {
    match actor {
        Actor::Anonymous => Err(Denial::NotAuthenticated),
        Actor::User(user) if user.is_staff || user.id == owner_id => Ok(()),
        Actor::User(_) => Err(Denial::Forbidden),
    }
}
