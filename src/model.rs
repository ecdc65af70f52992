use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;

/// Metadata of a single place page.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceRecord {
    pub id: u64,
    pub geo_id: u64,
    pub name: String,
    pub review_count: u64,
    pub rating: f32,
    pub address: Option<String>,
    pub ranking: Option<Ranking>,
    pub tags: Vec<String>,
    pub url: String,
}

/// Popularity ranking sentence and, when it could be parsed, the position in its cohort.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ranking {
    pub text: String,
    pub position: Option<u32>,
    pub length: Option<u32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewRecord {
    pub id: String,
    pub title: String,
    pub caption: String,
    pub timestamp: NaiveDate,
    pub rating: f32,
    pub username: String,
    pub reviewer_review_count: Option<u64>,
    pub location: Option<String>,
}

/// Reviews parsed from one page, minus those older than the watermark.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReviewBatch {
    pub records: Vec<ReviewRecord>,
    /// Number of reviews read off the page, including ones older than the watermark.
    pub scanned: usize,
    /// Containers dropped because their date couldn't be read.
    pub skipped: usize,
    pub found_boundary: bool,
}

/// Oldest review date a run is interested in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    pub min_date: NaiveDate,
}

impl Watermark {
    pub fn new(min_date: NaiveDate) -> Self {
        Self { min_date }
    }

    #[inline]
    pub fn admits(&self, date: NaiveDate) -> bool {
        date >= self.min_date
    }
}

/// Category filter for the search results page.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Section {
    Attractions,
    Eatery,
    Lodging,
    Activity,
    VacationRentals,
    Geos,
    UserProfile,
    TravelGuides,
}

impl Section {
    pub const ALL: [Section; 8] = [
        Section::Attractions,
        Section::Eatery,
        Section::Lodging,
        Section::Activity,
        Section::VacationRentals,
        Section::Geos,
        Section::UserProfile,
        Section::TravelGuides,
    ];

    /// Value of the `data-filter-id` attribute the site uses for this section.
    pub fn filter_id(&self) -> &'static str {
        match self {
            Section::Attractions => "ATTRACTIONS",
            Section::Eatery => "EATERY",
            Section::Lodging => "LODGING",
            Section::Activity => "ACTIVITY",
            Section::VacationRentals => "VACATION_RENTALS",
            Section::Geos => "GEOS",
            Section::UserProfile => "USER_PROFILE",
            Section::TravelGuides => "TRAVEL_GUIDES",
        }
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.filter_id())
    }
}

impl FromStr for Section {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase().replace('-', "_");
        Section::ALL
            .into_iter()
            .find(|section| section.filter_id() == wanted)
            .ok_or_else(|| format!("unknown listing section: {s}"))
    }
}
