//! Domain types shared by storage and the chat engine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Catalog identifier of a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ListingId(pub i64);

impl fmt::Display for ListingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i64> for ListingId {
    fn from(id: i64) -> Self {
        ListingId(id)
    }
}

/// Kind of property a renter asks for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyType {
    Apartment,
    House,
    Studio,
    Loft,
    Penthouse,
    Kitnet,
}

impl PropertyType {
    pub const ALL: [PropertyType; 6] = [
        PropertyType::Apartment,
        PropertyType::House,
        PropertyType::Studio,
        PropertyType::Loft,
        PropertyType::Penthouse,
        PropertyType::Kitnet,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PropertyType::Apartment => "apartment",
            PropertyType::House => "house",
            PropertyType::Studio => "studio",
            PropertyType::Loft => "loft",
            PropertyType::Penthouse => "penthouse",
            PropertyType::Kitnet => "kitnet",
        }
    }

    /// Lowercase words that identify this type in a listing title.
    pub fn title_terms(self) -> &'static [&'static str] {
        match self {
            PropertyType::Apartment => &["apartment", "apartamento", "apto", "flat"],
            PropertyType::House => &["house", "casa", "sobrado"],
            PropertyType::Studio => &["studio", "estudio", "estúdio"],
            PropertyType::Loft => &["loft"],
            PropertyType::Penthouse => &["penthouse", "cobertura"],
            PropertyType::Kitnet => &["kitnet", "kitinete", "kitchenette"],
        }
    }
}

impl fmt::Display for PropertyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One rentable property record, as stored in the catalog.
///
/// Listings are read-only from the engine's point of view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub id: ListingId,
    pub title: String,
    pub description: String,
    pub rooms: u32,
    pub bathrooms: u32,
    pub parking_spots: u32,
    /// Floor area in square meters.
    pub area: f64,
    pub city: String,
    pub neighborhood: String,
    pub street: String,
    pub street_number: String,
    /// Monthly rent.
    pub rent: f64,
    /// Monthly share of the property tax (IPTU).
    pub property_tax: f64,
    /// Monthly condominium fee.
    pub condo_fee: f64,
    pub pets_allowed: bool,
    #[serde(default)]
    pub neighborhood_code: String,
}

impl Listing {
    /// Rent plus property tax plus condo fee. Never negative.
    pub fn total_cost(&self) -> f64 {
        (self.rent + self.property_tax + self.condo_fee).max(0.0)
    }

    /// Street address in "street, number - neighborhood" form.
    pub fn address(&self) -> String {
        if self.street_number.is_empty() {
            format!("{} - {}", self.street, self.neighborhood)
        } else {
            format!(
                "{}, {} - {}",
                self.street, self.street_number, self.neighborhood
            )
        }
    }
}

/// A listing that has not been assigned an id yet (import format).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewListing {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub rooms: u32,
    #[serde(default)]
    pub bathrooms: u32,
    #[serde(default)]
    pub parking_spots: u32,
    #[serde(default)]
    pub area: f64,
    #[serde(default)]
    pub city: String,
    pub neighborhood: String,
    #[serde(default)]
    pub street: String,
    #[serde(default)]
    pub street_number: String,
    pub rent: f64,
    #[serde(default)]
    pub property_tax: f64,
    #[serde(default)]
    pub condo_fee: f64,
    #[serde(default)]
    pub pets_allowed: bool,
    #[serde(default)]
    pub neighborhood_code: String,
}

impl NewListing {
    /// Attach a catalog id.
    pub fn with_id(self, id: ListingId) -> Listing {
        Listing {
            id,
            title: self.title,
            description: self.description,
            rooms: self.rooms,
            bathrooms: self.bathrooms,
            parking_spots: self.parking_spots,
            area: self.area,
            city: self.city,
            neighborhood: self.neighborhood,
            street: self.street,
            street_number: self.street_number,
            rent: self.rent,
            property_tax: self.property_tax,
            condo_fee: self.condo_fee,
            pets_allowed: self.pets_allowed,
            neighborhood_code: self.neighborhood_code,
        }
    }
}
