use std::str::FromStr;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use bson::oid::ObjectId;
use mongodb::options::FindOptions;
use serde::{Deserialize, Serialize};
use tap::TapFallible;
use time::OffsetDateTime;
use validator::Validate;

use crate::{
    error::Error,
    mongo_ext::Collection,
    util::{FormattedDateTime, ObjectIdString, Pagination, PathObjectId},
};

use super::auth::Session;

#[derive(Clone)]
pub struct UserCollection(pub Collection<UserModel>);

impl std::ops::Deref for UserCollection {
    type Target = Collection<UserModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct UserModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub name: String,
    pub email: String,
    pub avatar: Option<String>,

    pub blood_group: String,
    pub district: String,
    pub upazila: String,

    pub role: UserRole,
    pub status: UserStatus,

    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

/// The sole authority for every gated action; no other record carries
/// permission data.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserRole {
    #[default]
    Donor,
    Volunteer,
    Admin,
}

impl FromStr for UserRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "donor" => Ok(Self::Donor),
            "volunteer" => Ok(Self::Volunteer),
            "admin" => Ok(Self::Admin),
            _ => Err(Error::InvalidRole(s.to_string())),
        }
    }
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Active,
    Blocked,
}

impl FromStr for UserStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "active" => Ok(Self::Active),
            "blocked" => Ok(Self::Blocked),
            _ => Err(Error::InvalidStatus(s.to_string())),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UserResponse {
    pub id: ObjectIdString,

    pub name: String,
    pub email: String,
    pub avatar: Option<String>,

    pub blood_group: String,
    pub district: String,
    pub upazila: String,

    pub role: UserRole,
    pub status: UserStatus,

    pub created_at: FormattedDateTime,
    pub updated_at: FormattedDateTime,
}

impl From<UserModel> for UserResponse {
    fn from(value: UserModel) -> Self {
        Self {
            id: value.id.into(),
            name: value.name,
            email: value.email,
            avatar: value.avatar,

            blood_group: value.blood_group,
            district: value.district,
            upazila: value.upazila,

            role: value.role,
            status: value.status,

            created_at: value.created_at.into(),
            updated_at: value.updated_at.into(),
        }
    }
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 124))]
    pub name: String,

    #[validate(email)]
    pub email: String,

    pub avatar: Option<String>,

    #[validate(length(min = 1, max = 8))]
    pub blood_group: String,

    pub district: String,
    pub upazila: String,
}

/// Mirrors the upstream contract: a duplicate registration is answered
/// with a marker instead of an error and nothing is inserted.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RegisterResponse {
    pub message: String,
    pub inserted_id: Option<ObjectIdString>,
}

pub async fn register(
    State(users): State<UserCollection>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<RegisterResponse>, Error> {
    request.validate()?;

    let count = users
        .count_documents(
            bson::doc! {
                "email": &request.email
            },
            None,
        )
        .await?;

    if count > 0 {
        tracing::debug!("duplicate registration for {}", request.email);
        return Ok(Json(RegisterResponse {
            message: "user already exists".to_string(),
            inserted_id: None,
        }));
    }

    let model = UserModel {
        id: ObjectId::new(),
        name: request.name,
        email: request.email,
        avatar: request.avatar,
        blood_group: request.blood_group,
        district: request.district,
        upazila: request.upazila,
        role: UserRole::default(),
        status: UserStatus::default(),
        created_at: OffsetDateTime::now_utc().into(),
        updated_at: OffsetDateTime::now_utc().into(),
    };
    users.insert_one(&model, None).await?;

    Ok(Json(RegisterResponse {
        message: "user registered".to_string(),
        inserted_id: Some(model.id.into()),
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct StatusFilter {
    pub status: Option<UserStatus>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IndexResponse {
    pub users: Vec<UserResponse>,
}

pub async fn index(
    State(users): State<UserCollection>,
    user: UserModel,
    Query(filter): Query<StatusFilter>,
    Query(page): Query<Pagination>,
) -> Result<Json<IndexResponse>, Error> {
    match user.role {
        UserRole::Donor | UserRole::Volunteer => return Err(Error::Forbidden),
        UserRole::Admin => {}
    }

    let mut query = bson::doc! {};
    if let Some(status) = filter.status {
        query.insert("status", bson::to_bson(&status)?);
    }

    let options = FindOptions::builder()
        .sort(bson::doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.size())
        .build();

    let mut cursor = users.find(query, options).await?;

    let mut result = vec![];

    while cursor.advance().await? {
        let user = cursor.deserialize_current()?;

        result.push(user.into());
    }

    Ok(Json(IndexResponse { users: result }))
}

pub async fn show(
    State(users): State<UserCollection>,
    user: UserModel,
    Path(email): Path<String>,
) -> Result<Json<UserResponse>, Error> {
    if user.email != email {
        match user.role {
            UserRole::Donor | UserRole::Volunteer => {
                return Err(Error::Forbidden)
                    .tap_err(|_| tracing::debug!("tried reading other user profile"))
            }
            UserRole::Admin => {}
        }
    }

    let model = users
        .find_one(
            bson::doc! {
                "email": &email,
            },
            None,
        )
        .await?
        .ok_or(Error::NoResource)?;

    Ok(Json(model.into()))
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct UpdateProfileRequest {
    #[validate(length(min = 1, max = 124))]
    pub name: String,

    pub avatar: Option<String>,

    #[validate(length(min = 1, max = 8))]
    pub blood_group: String,

    pub district: String,
    pub upazila: String,
}

/// Role and status are deliberately not touchable here; those go through
/// the admin-only `PATCH /role/:id` and `PATCH /status/:id`.
#[tracing::instrument(
    skip_all,
    fields(
        email = %email,
    )
)]
pub async fn update_profile(
    State(users): State<UserCollection>,
    user: UserModel,
    Path(email): Path<String>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, Error> {
    request.validate()?;

    if user.email != email {
        match user.role {
            UserRole::Donor | UserRole::Volunteer => {
                return Err(Error::Forbidden)
                    .tap_err(|_| tracing::debug!("tried updating other user profile"))
            }
            UserRole::Admin => {}
        }
    }

    let target = users
        .find_one(bson::doc! { "email": &email }, None)
        .await?
        .ok_or(Error::NoResource)?;

    let target = UserModel {
        name: request.name,
        avatar: request.avatar,
        blood_group: request.blood_group,
        district: request.district,
        upazila: request.upazila,
        updated_at: OffsetDateTime::now_utc().into(),

        id: target.id,
        email: target.email,
        role: target.role,
        status: target.status,
        created_at: target.created_at,
    };

    users
        .update_one_by_id(
            target.id,
            bson::doc! {
                "$set": bson::to_document(&target)?
            },
        )
        .await?;

    Ok(Json(target.into()))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct RoleResponse {
    pub role: UserRole,
}

/// The path email must equal the authenticated email regardless of role:
/// one user cannot query another's role.
pub async fn role(
    State(users): State<UserCollection>,
    session: Session,
    Path(email): Path<String>,
) -> Result<Json<RoleResponse>, Error> {
    if session.email != email {
        return Err(Error::Forbidden)
            .tap_err(|_| tracing::debug!("tried querying other user role"));
    }

    let model = users
        .find_one(bson::doc! { "email": &session.email }, None)
        .await?
        .ok_or(Error::NoResource)?;

    Ok(Json(RoleResponse { role: model.role }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateStatusRequest {
    pub status: String,
}

#[tracing::instrument(
    skip_all,
    fields(
        id = %id.0,
    )
)]
pub async fn update_status(
    State(users): State<UserCollection>,
    user: UserModel,
    id: PathObjectId,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<UserResponse>, Error> {
    match user.role {
        UserRole::Donor | UserRole::Volunteer => {
            return Err(Error::Forbidden)
                .tap_err(|_| tracing::debug!("tried changing user status without admin role"))
        }
        UserRole::Admin => {}
    }

    let status = UserStatus::from_str(&request.status)?;

    let target = users.get_one_by_id(id.0).await?.ok_or(Error::NoResource)?;

    users
        .update_one_by_id(
            id.0,
            bson::doc! {
                "$set": {
                    "status": bson::to_bson(&status)?,
                    "updated_at": bson::DateTime::from(OffsetDateTime::now_utc()),
                }
            },
        )
        .await?;

    Ok(Json(UserModel { status, ..target }.into()))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateRoleRequest {
    pub role: String,
}

#[tracing::instrument(
    skip_all,
    fields(
        id = %id.0,
    )
)]
pub async fn update_role(
    State(users): State<UserCollection>,
    user: UserModel,
    id: PathObjectId,
    Json(request): Json<UpdateRoleRequest>,
) -> Result<Json<UserResponse>, Error> {
    match user.role {
        UserRole::Donor | UserRole::Volunteer => {
            return Err(Error::Forbidden)
                .tap_err(|_| tracing::debug!("tried changing user role without admin role"))
        }
        UserRole::Admin => {}
    }

    let role = UserRole::from_str(&request.role)?;

    let target = users.get_one_by_id(id.0).await?.ok_or(Error::NoResource)?;

    users
        .update_one_by_id(
            id.0,
            bson::doc! {
                "$set": {
                    "role": bson::to_bson(&role)?,
                    "updated_at": bson::DateTime::from(OffsetDateTime::now_utc()),
                }
            },
        )
        .await?;

    Ok(Json(UserModel { role, ..target }.into()))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CountResponse {
    pub total: u64,
    pub donors: u64,
    pub volunteers: u64,
    pub admins: u64,
}

pub async fn count(
    State(users): State<UserCollection>,
    user: UserModel,
) -> Result<Json<CountResponse>, Error> {
    match user.role {
        UserRole::Donor | UserRole::Volunteer => return Err(Error::Forbidden),
        UserRole::Admin => {}
    }

    let total = users.count_documents(bson::doc! {}, None).await?;

    let mut by_role = [0u64; 3];
    for (count, role) in by_role
        .iter_mut()
        .zip([UserRole::Donor, UserRole::Volunteer, UserRole::Admin])
    {
        *count = users
            .count_documents(bson::doc! { "role": bson::to_bson(&role)? }, None)
            .await?;
    }

    Ok(Json(CountResponse {
        total,
        donors: by_role[0],
        volunteers: by_role[1],
        admins: by_role[2],
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct SearchDonorsQuery {
    pub blood_group: Option<String>,
    pub district: Option<String>,
    pub upazila: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SearchDonorsResponse {
    pub donors: Vec<UserResponse>,
}

/// Public donor directory; only active donors are listed.
pub async fn search_donors(
    State(users): State<UserCollection>,
    Query(search): Query<SearchDonorsQuery>,
    Query(page): Query<Pagination>,
) -> Result<Json<SearchDonorsResponse>, Error> {
    let mut query = bson::doc! {
        "role": bson::to_bson(&UserRole::Donor)?,
        "status": bson::to_bson(&UserStatus::Active)?,
    };

    if let Some(blood_group) = search.blood_group {
        query.insert("blood_group", blood_group);
    }
    if let Some(district) = search.district {
        query.insert("district", district);
    }
    if let Some(upazila) = search.upazila {
        query.insert("upazila", upazila);
    }

    let options = FindOptions::builder()
        .skip(page.skip())
        .limit(page.size())
        .build();

    let mut cursor = users.find(query, options).await?;

    let mut donors = vec![];

    while cursor.advance().await? {
        let donor = cursor.deserialize_current()?;

        donors.push(donor.into());
    }

    Ok(Json(SearchDonorsResponse { donors }))
}
