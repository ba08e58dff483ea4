use axum::{
    extract::{Query, State},
    Json,
};
use bson::oid::ObjectId;
use mongodb::options::FindOptions;
use rust_decimal::{prelude::ToPrimitive, Decimal};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use validator::Validate;

use crate::{
    error::Error,
    mongo_ext::Collection,
    util::{DecimalString, FormattedDateTime, ObjectIdString, Pagination},
};

use super::{
    auth::Session,
    donation::DonationRequestCollection,
    user::{UserCollection, UserModel, UserRole},
};

#[derive(Clone)]
pub struct PaymentCollection(pub Collection<PaymentModel>);

impl std::ops::Deref for PaymentCollection {
    type Target = Collection<PaymentModel>;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PaymentModel {
    #[serde(rename = "_id")]
    pub id: ObjectId,

    pub email: String,
    /// stored as a BSON double so the ledger can be `$sum`med
    pub amount: f64,
    pub transaction_id: Option<String>,

    pub created_at: bson::DateTime,
}

/// Thin wrapper over the processor's payment-intent endpoint; everything
/// beyond "create a card intent, hand back the client secret" is opaque to
/// this service.
#[derive(Clone)]
pub struct StripeClient {
    client: reqwest::Client,
    secret_key: String,
}

pub const PAYMENT_INTENT_URL: &str = "https://api.stripe.com/v1/payment_intents";

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: String,
}

impl StripeClient {
    pub fn new(secret_key: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            secret_key,
        }
    }

    pub fn new_from_env() -> Self {
        let secret_key = std::env::var("STRIPE_SECRET_KEY")
            .expect("Cannot retreive STRIPE_SECRET_KEY from environment variable.");

        Self::new(secret_key)
    }

    pub async fn create_payment_intent(&self, amount_minor: i64) -> Result<PaymentIntent, Error> {
        self.client
            .post(PAYMENT_INTENT_URL)
            .basic_auth(&self.secret_key, None::<&str>)
            .form(&[
                ("amount", amount_minor.to_string()),
                ("currency", "usd".to_string()),
                ("payment_method_types[]", "card".to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await
            .map_err(Into::into)
    }
}

/// Major currency units to the processor's minor units, truncated toward
/// zero like the upstream `parseInt(price * 100)`.
pub fn to_minor_units(price: Decimal) -> Result<i64, Error> {
    if price.is_sign_negative() {
        return Err(Error::InvalidAmount(price.to_string()));
    }

    (price * Decimal::from(100))
        .trunc()
        .to_i64()
        .ok_or_else(|| Error::InvalidAmount(price.to_string()))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateIntentRequest {
    pub price: DecimalString,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct CreateIntentResponse {
    pub client_secret: String,
}

pub async fn create_intent(
    State(stripe): State<StripeClient>,
    _session: Session,
    Json(request): Json<CreateIntentRequest>,
) -> Result<Json<CreateIntentResponse>, Error> {
    let amount = to_minor_units(request.price.into())?;

    let intent = stripe.create_payment_intent(amount).await?;

    Ok(Json(CreateIntentResponse {
        client_secret: intent.client_secret,
    }))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct PaymentResponse {
    pub id: ObjectIdString,

    pub email: String,
    pub amount: f64,
    pub transaction_id: Option<String>,

    pub created_at: FormattedDateTime,
}

impl From<PaymentModel> for PaymentResponse {
    fn from(value: PaymentModel) -> Self {
        Self {
            id: value.id.into(),

            email: value.email,
            amount: value.amount,
            transaction_id: value.transaction_id,

            created_at: value.created_at.into(),
        }
    }
}

#[derive(Validate, Serialize, Deserialize, Debug, Clone)]
pub struct RecordPaymentRequest {
    #[validate(range(min = 0.0))]
    pub amount: f64,

    pub transaction_id: Option<String>,
}

/// `POST /payments`: append-only ledger of completed payments.
#[tracing::instrument(
    skip_all,
    fields(
        email = %user.email,
    )
)]
pub async fn record(
    State(payments): State<PaymentCollection>,
    user: UserModel,
    Json(request): Json<RecordPaymentRequest>,
) -> Result<Json<PaymentResponse>, Error> {
    request.validate()?;

    let model = PaymentModel {
        id: ObjectId::new(),

        email: user.email,
        amount: request.amount,
        transaction_id: request.transaction_id,

        created_at: OffsetDateTime::now_utc().into(),
    };

    payments.insert_one(&model, None).await?;

    Ok(Json(model.into()))
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct IndexResponse {
    pub payments: Vec<PaymentResponse>,
}

pub async fn index(
    State(payments): State<PaymentCollection>,
    user: UserModel,
    Query(page): Query<Pagination>,
) -> Result<Json<IndexResponse>, Error> {
    match user.role {
        UserRole::Donor | UserRole::Volunteer => return Err(Error::Forbidden),
        UserRole::Admin => {}
    }

    let options = FindOptions::builder()
        .sort(bson::doc! { "created_at": -1 })
        .skip(page.skip())
        .limit(page.size())
        .build();

    let mut cursor = payments.find(None, options).await?;

    let mut result = vec![];

    while cursor.advance().await? {
        let payment = cursor.deserialize_current()?;

        result.push(payment.into());
    }

    Ok(Json(IndexResponse { payments: result }))
}

pub async fn total_collected(payments: &PaymentCollection) -> Result<f64, Error> {
    let pipeline = vec![bson::doc! {
        "$group": {
            "_id": null,
            "total": { "$sum": "$amount" },
        }
    }];

    let mut cursor = payments.aggregate(pipeline, None).await?;

    // an empty ledger sums to zero, not an error
    if cursor.advance().await? {
        let row = cursor.deserialize_current()?;
        Ok(row.get_f64("total").unwrap_or(0.0))
    } else {
        Ok(0.0)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct OverviewResponse {
    pub total_donors: u64,
    pub total_requests: u64,
    pub total_funding: f64,
}

/// `GET /overview/donors-requests`: the dashboard headline numbers.
pub async fn overview(
    State(payments): State<PaymentCollection>,
    State(users): State<UserCollection>,
    State(requests): State<DonationRequestCollection>,
    user: UserModel,
) -> Result<Json<OverviewResponse>, Error> {
    match user.role {
        UserRole::Donor => return Err(Error::Forbidden),
        UserRole::Volunteer | UserRole::Admin => {}
    }

    let total_donors = users
        .count_documents(bson::doc! { "role": bson::to_bson(&UserRole::Donor)? }, None)
        .await?;

    let total_requests = requests.count_documents(bson::doc! {}, None).await?;

    let total_funding = total_collected(&payments).await?;

    Ok(Json(OverviewResponse {
        total_donors,
        total_requests,
        total_funding,
    }))
}
