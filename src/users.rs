// Copyright 2023 Remi Bernotavicius

use crate::database::{
    self,
    models::{AuthToken, NewUser, User, UserId, UserRole},
};
use crate::error::{AppError, AppResult, FieldErrors};
use crate::pagination::PageRequest;
use diesel::prelude::OptionalExtension as _;
use diesel::ExpressionMethods as _;
use diesel::QueryDsl as _;
use diesel::RunQueryDsl as _;
use diesel::SelectableHelper as _;
use rand::Rng as _;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

const CONFIRMATION_CODE_LEN: usize = 10;
const CONFIRMATION_CODE_ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";
const MAX_NAME_LEN: usize = 150;

pub fn generate_confirmation_code() -> String {
    let mut rng = rand::thread_rng();
    (0..CONFIRMATION_CODE_LEN)
        .map(|_| {
            let i = rng.gen_range(0..CONFIRMATION_CODE_ALPHABET.len());
            CONFIRMATION_CODE_ALPHABET[i] as char
        })
        .collect()
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct UserView {
    pub email: String,
    pub id: UserId,
    pub username: String,
    pub first_name: String,
    pub last_name: String,
    pub is_subscribed: bool,
}

impl UserView {
    pub fn new(user: &User, is_subscribed: bool) -> Self {
        Self {
            email: user.email.clone(),
            id: user.id,
            username: user.username.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
            is_subscribed,
        }
    }
}

#[derive(Deserialize, Debug)]
pub struct SignupRequest {
    pub email: String,
    pub username: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

#[derive(Deserialize, Default, Debug)]
pub struct UserChanges {
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
}

fn check_email(errors: &mut FieldErrors, email: &str) {
    let valid = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty() && domain.contains('.') && !domain.contains('@') && email.len() <= 254
        }
        None => false,
    };
    if !valid {
        errors
            .entry("email")
            .or_default()
            .push("enter a valid email address".into());
    }
}

fn check_username(errors: &mut FieldErrors, username: &str) {
    let allowed = |c: char| c.is_alphanumeric() || ".@+-_".contains(c);
    if username.is_empty() || username.chars().count() > MAX_NAME_LEN {
        errors
            .entry("username")
            .or_default()
            .push(format!("must be 1 to {MAX_NAME_LEN} characters"));
    } else if !username.chars().all(allowed) {
        errors
            .entry("username")
            .or_default()
            .push("may contain only letters, digits and .@+-_".into());
    } else if username == "me" {
        errors
            .entry("username")
            .or_default()
            .push("\"me\" is reserved".into());
    }
}

fn check_person_name(errors: &mut FieldErrors, field: &'static str, value: &str) {
    if value.chars().count() > MAX_NAME_LEN {
        errors
            .entry(field)
            .or_default()
            .push(format!("must be at most {MAX_NAME_LEN} characters"));
    }
}

fn username_taken(conn: &mut database::Connection, name: &str) -> AppResult<bool> {
    use database::schema::users::dsl::*;

    let count: i64 = users
        .filter(username.eq(name))
        .count()
        .get_result(conn)?;
    Ok(count > 0)
}

pub fn find_by_email(conn: &mut database::Connection, address: &str) -> AppResult<Option<User>> {
    use database::schema::users::dsl::*;

    Ok(users
        .select(User::as_select())
        .filter(email.eq(address))
        .get_result(conn)
        .optional()?)
}

/// Creates the account, or hands back the existing one when the email is already
/// registered so the same confirmation code can be sent again.
pub fn signup(conn: &mut database::Connection, request: &SignupRequest) -> AppResult<User> {
    let address = request.email.trim().to_lowercase();
    if let Some(existing) = find_by_email(conn, &address)? {
        log::info!(
            "confirmation code for {}: {}",
            existing.email,
            existing.confirmation_code
        );
        return Ok(existing);
    }

    let mut errors = FieldErrors::new();
    check_email(&mut errors, &address);
    check_username(&mut errors, &request.username);
    check_person_name(&mut errors, "first_name", &request.first_name);
    check_person_name(&mut errors, "last_name", &request.last_name);
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }
    if username_taken(conn, &request.username)? {
        return Err(AppError::Conflict(format!(
            "username {:?} is already taken",
            request.username
        )));
    }

    let code = generate_confirmation_code();
    let user = diesel::insert_into(database::schema::users::table)
        .values(NewUser {
            email: &address,
            username: &request.username,
            first_name: &request.first_name,
            last_name: &request.last_name,
            confirmation_code: &code,
        })
        .returning(User::as_returning())
        .get_result(conn)?;

    log::info!("registered user {} ({})", user.id, user.username);
    log::info!("confirmation code for {}: {}", user.email, code);
    Ok(user)
}

pub fn issue_token(
    conn: &mut database::Connection,
    address: &str,
    code: &str,
) -> AppResult<String> {
    let address = address.trim().to_lowercase();
    let user = find_by_email(conn, &address)?
        .ok_or_else(|| AppError::not_found(format_args!("user with email {address:?}")))?;
    if user.confirmation_code != code {
        return Err(AppError::invalid(
            "confirmation_code",
            "wrong confirmation code for this email",
        ));
    }

    let token = AuthToken {
        key: uuid::Uuid::new_v4().simple().to_string(),
        user_id: user.id,
        created_at: chrono::Utc::now().naive_utc(),
    };
    diesel::insert_into(database::schema::auth_tokens::table)
        .values(&token)
        .execute(conn)?;

    log::debug!("issued token for user {}", user.id);
    Ok(token.key)
}

pub fn revoke_token(conn: &mut database::Connection, token_key: &str) -> AppResult<()> {
    use database::schema::auth_tokens::dsl::*;

    diesel::delete(auth_tokens.filter(key.eq(token_key))).execute(conn)?;
    Ok(())
}

pub fn authenticate(conn: &mut database::Connection, token_key: &str) -> AppResult<User> {
    use database::schema::{auth_tokens, users};

    auth_tokens::table
        .inner_join(users::table)
        .filter(auth_tokens::key.eq(token_key))
        .select(User::as_select())
        .get_result(conn)
        .optional()?
        .ok_or(AppError::Unauthorized)
}

/// Which of `authors` the viewer follows. Anonymous viewers follow nobody.
pub fn followed_among(
    conn: &mut database::Connection,
    viewer: Option<UserId>,
    authors: Vec<UserId>,
) -> AppResult<HashSet<UserId>> {
    use database::schema::follows::dsl::*;

    let Some(viewer) = viewer else {
        return Ok(HashSet::new());
    };
    Ok(follows
        .filter(user_id.eq(viewer))
        .filter(author_id.eq_any(authors))
        .select(author_id)
        .load::<UserId>(conn)?
        .into_iter()
        .collect())
}

pub fn get_user(conn: &mut database::Connection, user_id: UserId) -> AppResult<User> {
    use database::schema::users::dsl::*;

    users
        .find(user_id)
        .select(User::as_select())
        .get_result(conn)
        .optional()?
        .ok_or_else(|| AppError::not_found(format_args!("user {user_id}")))
}

pub fn user_view(
    conn: &mut database::Connection,
    viewer: Option<UserId>,
    user_id: UserId,
) -> AppResult<UserView> {
    let user = get_user(conn, user_id)?;
    let followed = followed_among(conn, viewer, vec![user.id])?;
    Ok(UserView::new(&user, followed.contains(&user.id)))
}

pub fn list_users(
    conn: &mut database::Connection,
    viewer: Option<UserId>,
    page: PageRequest,
) -> AppResult<(i64, Vec<UserView>)> {
    use database::schema::users::dsl::*;

    let count: i64 = users.count().get_result(conn)?;
    let page_of_users = users
        .select(User::as_select())
        .order(id.desc())
        .limit(page.limit)
        .offset(page.offset())
        .load(conn)?;

    let followed = followed_among(conn, viewer, page_of_users.iter().map(|u| u.id).collect())?;
    let views = page_of_users
        .iter()
        .map(|u| UserView::new(u, followed.contains(&u.id)))
        .collect();
    Ok((count, views))
}

pub fn update_user(
    conn: &mut database::Connection,
    user: &User,
    changes: &UserChanges,
) -> AppResult<UserView> {
    use database::schema::users::dsl::*;

    let mut errors = FieldErrors::new();
    if let Some(new_username) = &changes.username {
        check_username(&mut errors, new_username);
    }
    if let Some(value) = &changes.first_name {
        check_person_name(&mut errors, "first_name", value);
    }
    if let Some(value) = &changes.last_name {
        check_person_name(&mut errors, "last_name", value);
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    if let Some(new_username) = &changes.username {
        if *new_username != user.username && username_taken(conn, new_username)? {
            return Err(AppError::Conflict(format!(
                "username {new_username:?} is already taken"
            )));
        }
    }

    diesel::update(users.find(user.id))
        .set((
            username.eq(changes.username.as_deref().unwrap_or(&user.username)),
            first_name.eq(changes.first_name.as_deref().unwrap_or(&user.first_name)),
            last_name.eq(changes.last_name.as_deref().unwrap_or(&user.last_name)),
        ))
        .execute(conn)?;

    user_view(conn, Some(user.id), user.id)
}

pub fn set_role(
    conn: &mut database::Connection,
    address: &str,
    new_role: UserRole,
) -> AppResult<User> {
    use database::schema::users::dsl::*;

    let user = find_by_email(conn, &address.trim().to_lowercase())?
        .ok_or_else(|| AppError::not_found(format_args!("user with email {address:?}")))?;
    diesel::update(users.find(user.id))
        .set(role.eq(new_role))
        .execute(conn)?;
    get_user(conn, user.id)
}

#[cfg(test)]
pub fn signup_for_test(conn: &mut database::Connection, username: &str) -> User {
    signup(
        conn,
        &SignupRequest {
            email: format!("{username}@example.com"),
            username: username.into(),
            first_name: "Test".into(),
            last_name: "User".into(),
        },
    )
    .unwrap()
}

#[test]
fn confirmation_code_shape() {
    let code = generate_confirmation_code();
    assert_eq!(code.len(), CONFIRMATION_CODE_LEN);
    assert!(code
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
}

#[test]
fn signup_reuses_existing_account() {
    let pool = database::test_pool();
    let conn = &mut pool.get().unwrap();

    let first = signup_for_test(conn, "alice");
    let again = signup(
        conn,
        &SignupRequest {
            email: "ALICE@example.com".into(),
            username: "someone-else".into(),
            first_name: String::new(),
            last_name: String::new(),
        },
    )
    .unwrap();
    assert_eq!(first.id, again.id);
    assert_eq!(first.confirmation_code, again.confirmation_code);
}

#[test]
fn signup_rejects_taken_username_and_bad_email() {
    let pool = database::test_pool();
    let conn = &mut pool.get().unwrap();

    signup_for_test(conn, "bob");
    let taken = signup(
        conn,
        &SignupRequest {
            email: "other@example.com".into(),
            username: "bob".into(),
            first_name: String::new(),
            last_name: String::new(),
        },
    );
    assert!(matches!(taken, Err(AppError::Conflict(_))));

    let bad = signup(
        conn,
        &SignupRequest {
            email: "not-an-email".into(),
            username: "carol".into(),
            first_name: String::new(),
            last_name: String::new(),
        },
    );
    match bad {
        Err(AppError::Validation(fields)) => assert!(fields.contains_key("email")),
        _ => panic!("expected a validation error"),
    }
}

#[test]
fn token_round_trip() {
    let pool = database::test_pool();
    let conn = &mut pool.get().unwrap();

    let user = signup_for_test(conn, "dave");
    assert!(matches!(
        issue_token(conn, &user.email, "WRONG"),
        Err(AppError::Validation(_))
    ));
    assert!(matches!(
        issue_token(conn, "nobody@example.com", "X"),
        Err(AppError::NotFound(_))
    ));

    let key = issue_token(conn, &user.email, &user.confirmation_code).unwrap();
    assert_eq!(authenticate(conn, &key).unwrap().id, user.id);

    revoke_token(conn, &key).unwrap();
    assert!(matches!(
        authenticate(conn, &key),
        Err(AppError::Unauthorized)
    ));
}

#[test]
fn update_and_promote() {
    let pool = database::test_pool();
    let conn = &mut pool.get().unwrap();

    let erin = signup_for_test(conn, "erin");
    signup_for_test(conn, "frank");

    let view = update_user(
        conn,
        &erin,
        &UserChanges {
            first_name: Some("Erin".into()),
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(view.first_name, "Erin");
    assert_eq!(view.username, "erin");

    let clash = update_user(
        conn,
        &erin,
        &UserChanges {
            username: Some("frank".into()),
            ..Default::default()
        },
    );
    assert!(matches!(clash, Err(AppError::Conflict(_))));

    assert!(!erin.is_admin());
    let promoted = set_role(conn, &erin.email, UserRole::Admin).unwrap();
    assert!(promoted.is_admin());
}
