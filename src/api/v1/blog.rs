use axum::{
    extract::{Query, State},
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

use super::user::{UserModel, UserRole};

#[derive(Clone)]
pub struct BlogCollection(pub Collection<BlogModel>);

impl std::ops::Deref for BlogCollection {
    type Target = Collection<BlogModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BlogModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub title: String,
    pub thumbnail: Option<String>,
    pub content: String,
    pub author_email: String,

    pub status: BlogStatus,

    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum BlogStatus {
    #[default]
    Draft,
    Published,
}

impl BlogStatus {
    pub fn toggled(self) -> Self {
        match self {
            Self::Draft => Self::Published,
            Self::Published => Self::Draft,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct BlogResponse {
    pub id: ObjectIdString,

    pub title: String,
    pub thumbnail: Option<String>,
    pub content: String,
    pub author_email: String,

    pub status: BlogStatus,

    pub created_at: FormattedDateTime,
    pub updated_at: FormattedDateTime,
}

impl From<BlogModel> for BlogResponse {
    fn from(value: BlogModel) -> Self {
        Self {
            id: value.id.into(),

            title: value.title,
            thumbnail: value.thumbnail,
            content: value.content,
            author_email: value.author_email,

            status: value.status,

            created_at: value.created_at.into(),
            updated_at: value.updated_at.into(),
        }
    }
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct CreateRequest {
    #[validate(length(min = 1, max = 248))]
    pub title: String,

    pub thumbnail: Option<String>,

    #[validate(length(min = 1))]
    pub content: String,
}

/// Any authenticated caller may draft a blog; only publishing is gated.
#[tracing::instrument(
    skip_all,
    fields(
        author = %user.email,
    )
)]
pub async fn create(
    State(blogs): State<BlogCollection>,
    user: UserModel,
    Json(request): Json<CreateRequest>,
) -> Result<Json<BlogResponse>, Error> {
    request.validate()?;

    let model = BlogModel {
        id: ObjectId::new(),

        title: request.title,
        thumbnail: request.thumbnail,
        content: request.content,
        author_email: user.email,

        status: BlogStatus::Draft,

        created_at: OffsetDateTime::now_utc().into(),
        updated_at: OffsetDateTime::now_utc().into(),
    };

    blogs.insert_one(&model, None).await?;

    Ok(Json(model.into()))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IndexResponse {
    pub blogs: Vec<BlogResponse>,
}

async fn find_blogs(
    blogs: &BlogCollection,
    query: bson::Document,
    page: Pagination,
) -> Result<Vec<BlogResponse>, Error> {
    let options = FindOptions::builder()
        .sort(bson::doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.size())
        .build();

    let mut cursor = blogs.find(query, options).await?;

    let mut result = vec![];

    while cursor.advance().await? {
        let blog = cursor.deserialize_current()?;

        result.push(blog.into());
    }

    Ok(result)
}

/// `GET /blogs`: the public feed, published posts only.
pub async fn index_published(
    State(blogs): State<BlogCollection>,
    Query(page): Query<Pagination>,
) -> Result<Json<IndexResponse>, Error> {
    let query = bson::doc! { "status": bson::to_bson(&BlogStatus::Published)? };

    let blogs = find_blogs(&blogs, query, page).await?;

    Ok(Json(IndexResponse { blogs }))
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct BlogStatusFilter {
    pub status: Option<BlogStatus>,
}

/// `GET /all-blogs`: drafts included, for the content dashboard.
pub async fn index_all(
    State(blogs): State<BlogCollection>,
    user: UserModel,
    Query(filter): Query<BlogStatusFilter>,
    Query(page): Query<Pagination>,
) -> Result<Json<IndexResponse>, Error> {
    match user.role {
        UserRole::Donor => return Err(Error::Forbidden),
        UserRole::Volunteer | UserRole::Admin => {}
    }

    let mut query = bson::doc! {};
    if let Some(status) = filter.status {
        query.insert("status", bson::to_bson(&status)?);
    }

    let blogs = find_blogs(&blogs, query, page).await?;

    Ok(Json(IndexResponse { blogs }))
}

pub async fn show(
    State(blogs): State<BlogCollection>,
    _user: UserModel,
    id: PathObjectId,
) -> Result<Json<BlogResponse>, Error> {
    let blog = blogs.get_one_by_id(id.0).await?.ok_or(Error::NoResource)?;

    Ok(Json(blog.into()))
}

/// `PATCH /blog-published/:id`: flips draft↔published. Admin only.
#[tracing::instrument(
    skip_all,
    fields(
        id = %id.0,
        user = %user.email,
    )
)]
pub async fn toggle_published(
    State(blogs): State<BlogCollection>,
    user: UserModel,
    id: PathObjectId,
) -> Result<Json<BlogResponse>, Error> {
    match user.role {
        UserRole::Donor | UserRole::Volunteer => {
            return Err(Error::Forbidden)
                .tap_err(|_| tracing::debug!("tried toggling blog publish state without admin role"))
        }
        UserRole::Admin => {}
    }

    let blog = blogs.get_one_by_id(id.0).await?.ok_or(Error::NoResource)?;

    let status = blog.status.toggled();

    blogs
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

    Ok(Json(BlogModel { status, ..blog }.into()))
}

#[tracing::instrument(
    skip_all,
    fields(
        id = %id.0,
        user = %user.email,
    )
)]
pub async fn delete(
    State(blogs): State<BlogCollection>,
    user: UserModel,
    id: PathObjectId,
) -> Result<(), Error> {
    match user.role {
        UserRole::Donor | UserRole::Volunteer => {
            return Err(Error::Forbidden)
                .tap_err(|_| tracing::debug!("tried deleting blog without admin role"))
        }
        UserRole::Admin => {}
    }

    blogs
        .get_one_by_id(id.0)
        .await?
        .ok_or(Error::NoResource)
        .tap_err(|_| tracing::debug!("tried deleting non existing blog"))?;

    blogs.delete_one_by_id(id.0).await?;

    Ok(())
}
