use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use chrono::NaiveDate;
use csv::{Writer, WriterBuilder};
use serde::{Serialize, Serializer};
use tokio::io::AsyncWriteExt;
use tracing::debug;

use crate::model::{PlaceRecord, ReviewRecord};
use crate::Result;

/// Append-only CSV file. The header is only written when the file starts out empty, so
/// repeated runs keep adding to the same table.
pub struct CsvSink {
    path: PathBuf,
    writer: Writer<File>,
    rows: usize,
}

impl CsvSink {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        let is_new = file.metadata()?.len() == 0;
        let writer = WriterBuilder::new().has_headers(is_new).from_writer(file);
        debug!("opened {} (new: {is_new})", path.display());

        Ok(Self {
            path,
            writer,
            rows: 0,
        })
    }

    pub fn write_review(&mut self, review: &ReviewRecord) -> Result<()> {
        self.writer.serialize(ReviewRow::from(review))?;
        self.rows += 1;
        Ok(())
    }

    pub fn write_place(&mut self, place: &PlaceRecord) -> Result<()> {
        self.writer.serialize(PlaceRow::from(place))?;
        self.rows += 1;
        Ok(())
    }

    /// Pushes buffered rows to disk. Called after every page so a crash loses nothing
    /// already scraped.
    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn rows_written(&self) -> usize {
        self.rows
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Writes one url per line.
pub async fn write_url_list(path: impl AsRef<Path>, urls: &[String]) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let body = urls
        .iter()
        .flat_map(|url| [url.as_str(), "\n"])
        .collect::<String>();
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(body.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

pub async fn read_url_list(path: impl AsRef<Path>) -> Result<Vec<String>> {
    let body = tokio::fs::read_to_string(path).await?;
    Ok(body
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(String::from)
        .collect())
}

#[derive(Serialize)]
struct ReviewRow<'a> {
    id_review: &'a str,
    title: &'a str,
    caption: &'a str,
    #[serde(serialize_with = "iso_date")]
    timestamp: NaiveDate,
    rating: f32,
    username: &'a str,
    n_review_user: Option<u64>,
    location: Option<&'a str>,
}

impl<'a> From<&'a ReviewRecord> for ReviewRow<'a> {
    fn from(r: &'a ReviewRecord) -> Self {
        Self {
            id_review: &r.id,
            title: &r.title,
            caption: &r.caption,
            timestamp: r.timestamp,
            rating: r.rating,
            username: &r.username,
            n_review_user: r.reviewer_review_count,
            location: r.location.as_deref(),
        }
    }
}

#[derive(Serialize)]
struct PlaceRow<'a> {
    id: u64,
    name: &'a str,
    reviews: u64,
    rating: f32,
    address: Option<&'a str>,
    ranking_string: Option<&'a str>,
    ranking_pos: Option<u32>,
    tags: String,
    ranking_length: Option<u32>,
    url: &'a str,
}

impl<'a> From<&'a PlaceRecord> for PlaceRow<'a> {
    fn from(p: &'a PlaceRecord) -> Self {
        let ranking = p.ranking.as_ref();
        Self {
            id: p.id,
            name: &p.name,
            reviews: p.review_count,
            rating: p.rating,
            address: p.address.as_deref(),
            ranking_string: ranking.map(|r| r.text.as_str()),
            ranking_pos: ranking.and_then(|r| r.position),
            tags: p.tags.join(";"),
            ranking_length: ranking.and_then(|r| r.length),
            url: &p.url,
        }
    }
}

fn iso_date<S: Serializer>(date: &NaiveDate, s: S) -> core::result::Result<S::Ok, S::Error> {
    s.collect_str(&date.format("%Y-%m-%d"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Ranking;

    fn review(id: &str) -> ReviewRecord {
        ReviewRecord {
            id: id.into(),
            title: "Nice, really".into(),
            caption: "Went twice".into(),
            timestamp: NaiveDate::from_ymd_opt(2020, 3, 14).unwrap(),
            rating: 4.5,
            username: "ana".into(),
            reviewer_review_count: Some(12),
            location: None,
        }
    }

    #[test]
    fn review_csv_has_header_once_across_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/reviews.csv");

        let mut sink = CsvSink::open(&path).unwrap();
        sink.write_review(&review("1")).unwrap();
        sink.flush().unwrap();
        drop(sink);

        let mut sink = CsvSink::open(&path).unwrap();
        sink.write_review(&review("2")).unwrap();
        sink.flush().unwrap();
        assert_eq!(sink.rows_written(), 1);

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines,
            [
                "id_review,title,caption,timestamp,rating,username,n_review_user,location",
                "1,\"Nice, really\",Went twice,2020-03-14,4.5,ana,12,",
                "2,\"Nice, really\",Went twice,2020-03-14,4.5,ana,12,",
            ]
        );
    }

    #[test]
    fn place_csv_joins_tags_and_flattens_ranking() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("places.csv");
        let place = PlaceRecord {
            id: 1234567,
            geo_id: 890,
            name: "Old Bridge".into(),
            review_count: 1234,
            rating: 4.5,
            address: None,
            ranking: Some(Ranking {
                text: "#3 of 120 things to do".into(),
                position: Some(3),
                length: Some(120),
            }),
            tags: vec!["Bridges".into(), "Points of Interest".into()],
            url: "https://www.tripadvisor.com/x".into(),
        };

        let mut sink = CsvSink::open(&path).unwrap();
        sink.write_place(&place).unwrap();
        sink.flush().unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(
            lines[0],
            "id,name,reviews,rating,address,ranking_string,ranking_pos,tags,ranking_length,url"
        );
        assert_eq!(
            lines[1],
            "1234567,Old Bridge,1234,4.5,,#3 of 120 things to do,3,Bridges;Points of Interest,120,https://www.tripadvisor.com/x"
        );
    }

    #[tokio::test]
    async fn url_list_round_trips_one_per_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.txt");
        let urls = vec!["https://a/1".to_string(), "https://a/2".to_string()];

        write_url_list(&path, &urls).await.unwrap();

        assert_eq!(
            tokio::fs::read_to_string(&path).await.unwrap(),
            "https://a/1\nhttps://a/2\n"
        );
        assert_eq!(read_url_list(&path).await.unwrap(), urls);
    }
}
