//! Cart, shipping and payment types used by the checkout calculator.

use core::fmt;

use serde::{Deserialize, Serialize};

use super::id::ProductId;
use super::money::Yen;

/// Flat surcharge added when the customer pays cash on delivery.
pub const COD_FEE: Yen = Yen::new(500);

/// One line of the cart as seen by the calculator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartLine {
    /// Backend product id.
    pub product_id: ProductId,
    /// Price of a single unit.
    pub unit_price: Yen,
    /// Number of units, always at least one in a valid cart.
    pub quantity: u32,
}

impl CartLine {
    /// Create a cart line.
    #[must_use]
    pub fn new(product_id: impl Into<ProductId>, unit_price: Yen, quantity: u32) -> Self {
        Self {
            product_id: product_id.into(),
            unit_price,
            quantity,
        }
    }

    /// `unit_price × quantity`.
    #[must_use]
    pub fn line_total(&self) -> Yen {
        self.unit_price.times(self.quantity)
    }
}

/// Stable identifier of a delivery method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ShippingOptionId {
    /// Customer collects the bike in store.
    #[serde(rename = "pickup")]
    Pickup,
    /// Free local delivery.
    #[default]
    #[serde(rename = "free_delivery")]
    FreeDelivery,
    /// Paid delivery, nearer zone.
    #[serde(rename = "zone_1")]
    Zone1,
    /// Paid delivery, farther zone.
    #[serde(rename = "zone_2")]
    Zone2,
    /// Boxed and sent by post.
    #[serde(rename = "postal")]
    Postal,
}

impl ShippingOptionId {
    /// Every option, in display order.
    pub const ALL: [Self; 5] = [
        Self::Pickup,
        Self::FreeDelivery,
        Self::Zone1,
        Self::Zone2,
        Self::Postal,
    ];

    /// Wire name of the option.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pickup => "pickup",
            Self::FreeDelivery => "free_delivery",
            Self::Zone1 => "zone_1",
            Self::Zone2 => "zone_2",
            Self::Postal => "postal",
        }
    }

    /// The catalog entry for this id.
    #[must_use]
    pub const fn option(self) -> &'static ShippingOption {
        match self {
            Self::Pickup => &SHIPPING_OPTIONS[0],
            Self::FreeDelivery => &SHIPPING_OPTIONS[1],
            Self::Zone1 => &SHIPPING_OPTIONS[2],
            Self::Zone2 => &SHIPPING_OPTIONS[3],
            Self::Postal => &SHIPPING_OPTIONS[4],
        }
    }

    /// Whether the customer has to give a delivery address.
    #[must_use]
    pub const fn requires_address(self) -> bool {
        !matches!(self, Self::Pickup)
    }
}

impl fmt::Display for ShippingOptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ShippingOptionId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|id| id.as_str() == s)
            .ok_or_else(|| format!("unknown shipping option: {s}"))
    }
}

/// A fixed-fee delivery method from the static catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingOption {
    /// Stable id.
    pub id: ShippingOptionId,
    /// Fee charged for this method.
    pub fee: Yen,
    /// Short label.
    pub display_name: &'static str,
    /// One-line explanation shown under the label.
    pub description: &'static str,
}

/// The storefront's shipping catalog, in display order.
pub const SHIPPING_OPTIONS: [ShippingOption; 5] = [
    ShippingOption {
        id: ShippingOptionId::Pickup,
        fee: Yen::ZERO,
        display_name: "Store pickup",
        description: "Collect your bike at the shop, fitted and ready to ride",
    },
    ShippingOption {
        id: ShippingOptionId::FreeDelivery,
        fee: Yen::ZERO,
        display_name: "Free delivery",
        description: "Free delivery within the city",
    },
    ShippingOption {
        id: ShippingOptionId::Zone1,
        fee: Yen::new(2_500),
        display_name: "Delivery zone 1",
        description: "Neighbouring prefectures",
    },
    ShippingOption {
        id: ShippingOptionId::Zone2,
        fee: Yen::new(5_000),
        display_name: "Delivery zone 2",
        description: "Long-distance delivery",
    },
    ShippingOption {
        id: ShippingOptionId::Postal,
        fee: Yen::new(3_500),
        display_name: "Postal shipping",
        description: "Boxed and shipped by post, partial assembly required",
    },
];

/// How the customer pays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Bank transfer before dispatch.
    #[default]
    BankTransfer,
    /// Card payment.
    VisaCard,
    /// Cash on delivery, carries [`COD_FEE`].
    Cod,
}

impl PaymentMethod {
    /// Surcharge for this payment method.
    #[must_use]
    pub const fn fee(self) -> Yen {
        match self {
            Self::Cod => COD_FEE,
            Self::BankTransfer | Self::VisaCard => Yen::ZERO,
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BankTransfer => write!(f, "bank_transfer"),
            Self::VisaCard => write!(f, "visa_card"),
            Self::Cod => write!(f, "cod"),
        }
    }
}
