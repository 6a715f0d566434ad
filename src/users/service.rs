use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::model::{NewUser, UpdateUser, User};
use super::store::UserStore;
use super::validator::UserValidator;
use crate::message::{Action, CompletionPayload};
use crate::service::{Context, CrudService, HandlerError, HandlerResult};

/// Channel family served by [`user_service`].
pub const FAMILY: &str = "User";

#[derive(Debug, Deserialize)]
struct ById {
    id: String,
}

/// The `User` family's CRUD handlers over `store`.
///
/// | action      | success                       |
/// |-------------|-------------------------------|
/// | `create`    | 201 with the stored user      |
/// | `update`    | 200 with the updated user     |
/// | `getSingle` | 200 with the user             |
/// | `delete`    | 200 with the removed user     |
/// | `getAll`    | 200 with a list, 204 if empty |
pub fn user_service(store: UserStore) -> CrudService {
    let create = store.clone();
    let update = store.clone();
    let get_single = store.clone();
    let delete = store.clone();
    let get_all = store;

    CrudService::new(FAMILY)
        .on_async(Action::Create, move |ctx| create_user(create.clone(), ctx))
        .on_async(Action::Update, move |ctx| update_user(update.clone(), ctx))
        .on_async(Action::GetSingle, move |ctx| get_user(get_single.clone(), ctx))
        .on_async(Action::Delete, move |ctx| delete_user(delete.clone(), ctx))
        .on(Action::GetAll, move |_| get_all_users(&get_all))
}

async fn create_user(store: UserStore, ctx: Context) -> HandlerResult {
    let request: NewUser = ctx.input()?;
    let existing = store.find_by_msisdn(&request.msisdn);
    UserValidator::validate_create(existing.as_ref(), &request).await?;

    let msisdn = request.msisdn.clone();
    let user = User::from_new(Uuid::new_v4().to_string(), request);
    // A concurrent create may have taken the number since validation.
    store
        .insert_unique(user.clone())
        .map_err(|_| UserValidator::number_taken(&msisdn))?;
    tracing::info!(id = %user.id, correlation_id = ctx.correlation_id(), "user created");
    Ok(CompletionPayload::created(json!(user)))
}

async fn update_user(store: UserStore, ctx: Context) -> HandlerResult {
    let request: UpdateUser = ctx.input()?;
    let existing = store.get(&request.id);
    UserValidator::validate_update(existing.as_ref(), &request).await?;

    let mut user = existing.ok_or_else(|| HandlerError::NotFound(request.id.clone()))?;
    user.apply(request);
    store.save(user.clone());
    Ok(CompletionPayload::ok(json!(user)))
}

async fn get_user(store: UserStore, ctx: Context) -> HandlerResult {
    let ById { id } = ctx.input()?;
    let existing = store.get(&id);
    UserValidator::validate_exists(existing.as_ref(), &id).await?;

    let user = existing.ok_or(HandlerError::NotFound(id))?;
    Ok(CompletionPayload::ok(json!(user)))
}

async fn delete_user(store: UserStore, ctx: Context) -> HandlerResult {
    let ById { id } = ctx.input()?;
    let existing = store.get(&id);
    UserValidator::validate_exists(existing.as_ref(), &id).await?;

    let user = store.remove(&id).ok_or(HandlerError::NotFound(id))?;
    tracing::info!(id = %user.id, correlation_id = ctx.correlation_id(), "user deleted");
    Ok(CompletionPayload::ok(json!(user)))
}

fn get_all_users(store: &UserStore) -> HandlerResult {
    let users = store.all();
    if users.is_empty() {
        return Ok(CompletionPayload::no_content());
    }
    Ok(CompletionPayload::ok(json!(users)))
}
