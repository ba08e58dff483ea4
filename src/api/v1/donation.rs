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

use super::user::{UserModel, UserRole, UserStatus};

#[derive(Clone)]
pub struct DonationRequestCollection(pub Collection<DonationRequestModel>);

impl std::ops::Deref for DonationRequestCollection {
    type Target = Collection<DonationRequestModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DonationRequestModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub requester_name: String,
    pub requester_email: String,

    pub recipient_name: String,
    pub blood_group: String,
    pub district: String,
    pub upazila: String,
    pub hospital_name: String,
    pub full_address: String,

    pub donation_date: String,
    pub donation_time: String,
    pub request_message: String,

    pub status: DonationStatus,
    pub donor: Option<DonorRef>,

    pub created_at: bson::DateTime,
    pub updated_at: bson::DateTime,
}

/// The donor who volunteered for an in-progress request.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct DonorRef {
    pub name: String,
    pub email: String,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DonationStatus {
    #[default]
    Pending,
    InProgress,
    Done,
    Cancelled,
}

impl FromStr for DonationStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "inprogress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            "cancelled" => Ok(Self::Cancelled),
            _ => Err(Error::InvalidStatus(s.to_string())),
        }
    }
}

impl DonationStatus {
    /// pending → inprogress → {done, cancelled}. Anything else conflicts.
    pub fn check_transition(self, target: DonationStatus) -> Result<(), Error> {
        match (self, target) {
            (Self::Pending, Self::InProgress) => Ok(()),
            (Self::InProgress, Self::Done | Self::Cancelled) => Ok(()),
            (_, Self::InProgress) => Err(Error::Conflict("donation request is not pending")),
            (_, Self::Done | Self::Cancelled) => {
                Err(Error::Conflict("donation request is not in progress"))
            }
            (_, Self::Pending) => Err(Error::Conflict(
                "donation request cannot go back to pending",
            )),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct DonationRequestResponse {
    pub id: ObjectIdString,

    pub requester_name: String,
    pub requester_email: String,

    pub recipient_name: String,
    pub blood_group: String,
    pub district: String,
    pub upazila: String,
    pub hospital_name: String,
    pub full_address: String,

    pub donation_date: String,
    pub donation_time: String,
    pub request_message: String,

    pub status: DonationStatus,
    pub donor: Option<DonorRef>,

    pub created_at: FormattedDateTime,
    pub updated_at: FormattedDateTime,
}

impl From<DonationRequestModel> for DonationRequestResponse {
    fn from(value: DonationRequestModel) -> Self {
        Self {
            id: value.id.into(),

            requester_name: value.requester_name,
            requester_email: value.requester_email,

            recipient_name: value.recipient_name,
            blood_group: value.blood_group,
            district: value.district,
            upazila: value.upazila,
            hospital_name: value.hospital_name,
            full_address: value.full_address,

            donation_date: value.donation_date,
            donation_time: value.donation_time,
            request_message: value.request_message,

            status: value.status,
            donor: value.donor,

            created_at: value.created_at.into(),
            updated_at: value.updated_at.into(),
        }
    }
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct CreateRequest {
    #[validate(length(min = 1, max = 124))]
    pub recipient_name: String,

    #[validate(length(min = 1, max = 8))]
    pub blood_group: String,

    pub district: String,
    pub upazila: String,

    #[validate(length(min = 1, max = 248))]
    pub hospital_name: String,

    #[validate(length(min = 1, max = 496))]
    pub full_address: String,

    pub donation_date: String,
    pub donation_time: String,

    #[validate(length(max = 2048))]
    pub request_message: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateResponse {
    pub message: String,
    pub inserted_id: Option<ObjectIdString>,
}

/// A blocked account is answered with the explanatory marker, not an HTTP
/// error, and nothing is inserted (upstream contract).
#[tracing::instrument(
    skip_all,
    fields(
        requester = %user.email,
    )
)]
pub async fn create(
    State(requests): State<DonationRequestCollection>,
    user: UserModel,
    Json(request): Json<CreateRequest>,
) -> Result<Json<CreateResponse>, Error> {
    request.validate()?;

    if let UserStatus::Blocked = user.status {
        tracing::debug!("blocked account tried creating a donation request");
        return Ok(Json(CreateResponse {
            message: "blocked account cannot create donation requests".to_string(),
            inserted_id: None,
        }));
    }

    let model = DonationRequestModel {
        id: ObjectId::new(),

        requester_name: user.name,
        requester_email: user.email,

        recipient_name: request.recipient_name,
        blood_group: request.blood_group,
        district: request.district,
        upazila: request.upazila,
        hospital_name: request.hospital_name,
        full_address: request.full_address,

        donation_date: request.donation_date,
        donation_time: request.donation_time,
        request_message: request.request_message,

        status: DonationStatus::Pending,
        donor: None,

        created_at: OffsetDateTime::now_utc().into(),
        updated_at: OffsetDateTime::now_utc().into(),
    };

    requests.insert_one(&model, None).await?;

    Ok(Json(CreateResponse {
        message: "donation request created".to_string(),
        inserted_id: Some(model.id.into()),
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct DonationStatusFilter {
    pub status: Option<DonationStatus>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IndexResponse {
    pub requests: Vec<DonationRequestResponse>,
}

async fn find_requests(
    requests: &DonationRequestCollection,
    query: bson::Document,
    page: Pagination,
) -> Result<Vec<DonationRequestResponse>, Error> {
    // most recent first
    let options = FindOptions::builder()
        .sort(bson::doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.size())
        .build();

    let mut cursor = requests.find(query, options).await?;

    let mut result = vec![];

    while cursor.advance().await? {
        let request = cursor.deserialize_current()?;

        result.push(request.into());
    }

    Ok(result)
}

/// `GET /donation-request/:email`: a requester's own history, newest
/// first. Admins and volunteers may read anyone's.
pub async fn index_by_requester(
    State(requests): State<DonationRequestCollection>,
    user: UserModel,
    Path(email): Path<String>,
    Query(filter): Query<DonationStatusFilter>,
    Query(page): Query<Pagination>,
) -> Result<Json<IndexResponse>, Error> {
    if user.email != email {
        match user.role {
            UserRole::Donor => {
                return Err(Error::Forbidden)
                    .tap_err(|_| tracing::debug!("tried listing other user donation requests"))
            }
            UserRole::Volunteer | UserRole::Admin => {}
        }
    }

    let mut query = bson::doc! { "requester_email": &email };
    if let Some(status) = filter.status {
        query.insert("status", bson::to_bson(&status)?);
    }

    let requests = find_requests(&requests, query, page).await?;

    Ok(Json(IndexResponse { requests }))
}

/// `GET /donation-req`: public browsing of open requests.
pub async fn index_pending(
    State(requests): State<DonationRequestCollection>,
    Query(page): Query<Pagination>,
) -> Result<Json<IndexResponse>, Error> {
    let query = bson::doc! { "status": bson::to_bson(&DonationStatus::Pending)? };

    let requests = find_requests(&requests, query, page).await?;

    Ok(Json(IndexResponse { requests }))
}

/// `GET /all-donation-req`: the coordination dashboard.
pub async fn index_all(
    State(requests): State<DonationRequestCollection>,
    user: UserModel,
    Query(filter): Query<DonationStatusFilter>,
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

    let requests = find_requests(&requests, query, page).await?;

    Ok(Json(IndexResponse { requests }))
}

pub async fn show(
    State(requests): State<DonationRequestCollection>,
    _user: UserModel,
    id: PathObjectId,
) -> Result<Json<DonationRequestResponse>, Error> {
    let request = requests
        .get_one_by_id(id.0)
        .await?
        .ok_or(Error::NoResource)?;

    Ok(Json(request.into()))
}

fn check_owner_or_admin(user: &UserModel, request: &DonationRequestModel) -> Result<(), Error> {
    if request.requester_email == user.email {
        return Ok(());
    }

    match user.role {
        UserRole::Admin => Ok(()),
        UserRole::Donor | UserRole::Volunteer => Err(Error::Forbidden),
    }
}

/// `PUT /donation-update/:id` overwrites the request fields but never the
/// lifecycle: status, donor and created_at are preserved.
#[tracing::instrument(
    skip_all,
    fields(
        id = %id.0,
        user = %user.email,
    )
)]
pub async fn update(
    State(requests): State<DonationRequestCollection>,
    user: UserModel,
    id: PathObjectId,
    Json(request): Json<CreateRequest>,
) -> Result<Json<DonationRequestResponse>, Error> {
    request.validate()?;

    let model = requests
        .get_one_by_id(id.0)
        .await?
        .ok_or(Error::NoResource)
        .tap_err(|_| tracing::debug!("tried updating non existing donation request"))?;

    check_owner_or_admin(&user, &model)
        .tap_err(|_| tracing::debug!("tried updating other user donation request"))?;

    let model = DonationRequestModel {
        recipient_name: request.recipient_name,
        blood_group: request.blood_group,
        district: request.district,
        upazila: request.upazila,
        hospital_name: request.hospital_name,
        full_address: request.full_address,
        donation_date: request.donation_date,
        donation_time: request.donation_time,
        request_message: request.request_message,
        updated_at: OffsetDateTime::now_utc().into(),

        id: model.id,
        requester_name: model.requester_name,
        requester_email: model.requester_email,
        status: model.status,
        donor: model.donor,
        created_at: model.created_at,
    };

    requests
        .update_one_by_id(
            id.0,
            bson::doc! {
                "$set": bson::to_document(&model)?
            },
        )
        .await?;

    Ok(Json(model.into()))
}

#[tracing::instrument(
    skip_all,
    fields(
        id = %id.0,
        user = %user.email,
    )
)]
pub async fn delete(
    State(requests): State<DonationRequestCollection>,
    user: UserModel,
    id: PathObjectId,
) -> Result<(), Error> {
    let model = requests
        .get_one_by_id(id.0)
        .await?
        .ok_or(Error::NoResource)
        .tap_err(|_| tracing::debug!("tried deleting non existing donation request"))?;

    check_owner_or_admin(&user, &model)
        .tap_err(|_| tracing::debug!("tried deleting other user donation request"))?;

    requests.delete_one_by_id(id.0).await?;

    Ok(())
}

/// `PATCH /blood-req-status/:id`: the authenticated caller volunteers to
/// donate. Only a pending request can be claimed.
#[tracing::instrument(
    skip_all,
    fields(
        id = %id.0,
        donor = %user.email,
    )
)]
pub async fn claim(
    State(requests): State<DonationRequestCollection>,
    user: UserModel,
    id: PathObjectId,
) -> Result<Json<DonationRequestResponse>, Error> {
    let model = requests
        .get_one_by_id(id.0)
        .await?
        .ok_or(Error::NoResource)?;

    model
        .status
        .check_transition(DonationStatus::InProgress)
        .tap_err(|_| tracing::debug!("tried claiming a non pending donation request"))?;

    let donor = DonorRef {
        name: user.name,
        email: user.email,
    };

    requests
        .update_one_by_id(
            id.0,
            bson::doc! {
                "$set": {
                    "status": bson::to_bson(&DonationStatus::InProgress)?,
                    "donor": bson::to_bson(&donor)?,
                    "updated_at": bson::DateTime::from(OffsetDateTime::now_utc()),
                }
            },
        )
        .await?;

    Ok(Json(
        DonationRequestModel {
            status: DonationStatus::InProgress,
            donor: Some(donor),
            ..model
        }
        .into(),
    ))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct UpdateStatusRequest {
    pub status: String,
}

/// `PATCH /blood-status/:id`: finish or cancel an in-progress request.
/// Restricted to the requester, the assigned donor, or an admin.
#[tracing::instrument(
    skip_all,
    fields(
        id = %id.0,
        user = %user.email,
    )
)]
pub async fn update_status(
    State(requests): State<DonationRequestCollection>,
    user: UserModel,
    id: PathObjectId,
    Json(request): Json<UpdateStatusRequest>,
) -> Result<Json<DonationRequestResponse>, Error> {
    let target = DonationStatus::from_str(&request.status)?;

    let model = requests
        .get_one_by_id(id.0)
        .await?
        .ok_or(Error::NoResource)?;

    let is_assigned_donor = model
        .donor
        .as_ref()
        .map(|donor| donor.email == user.email)
        .unwrap_or(false);

    if !is_assigned_donor {
        check_owner_or_admin(&user, &model)
            .tap_err(|_| tracing::debug!("tried setting status of unrelated donation request"))?;
    }

    model.status.check_transition(target)?;

    requests
        .update_one_by_id(
            id.0,
            bson::doc! {
                "$set": {
                    "status": bson::to_bson(&target)?,
                    "updated_at": bson::DateTime::from(OffsetDateTime::now_utc()),
                }
            },
        )
        .await?;

    Ok(Json(
        DonationRequestModel {
            status: target,
            ..model
        }
        .into(),
    ))
}
