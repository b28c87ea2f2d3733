use chrono::{DateTime, TimeZone};
use std::fmt::Display;

use phototaker::Metadata;
use proto::{Coordinate, NavigationFix};

pub const MAX_USER_TAGS: usize = 32;

const DATE_FORMAT: &str = "%Y:%m:%d %H:%M:%S";

/// Tags attached to every capture.
#[derive(Clone, Debug)]
pub struct TagConfig {
    pub enabled: bool,
    pub make: String,
    pub model: String,
    /// Extra `KEY=VALUE` tags, written after the generated ones.
    pub user: Vec<String>,
}

impl TagConfig {
    pub fn metadata<Tz>(&self, fix: Option<&NavigationFix>, now: &DateTime<Tz>) -> Metadata
    where
        Tz: TimeZone,
        Tz::Offset: Display,
    {
        if !self.enabled {
            return Metadata::Disabled;
        }

        let mut tags = vec![
            format!("IFD0.Model={}", self.model),
            format!("IFD0.Make={}", self.make),
        ];
        let stamp = now.format(DATE_FORMAT).to_string();
        tags.push(format!("EXIF.DateTimeDigitized={stamp}"));
        tags.push(format!("EXIF.DateTimeOriginal={stamp}"));
        tags.push(format!("IFD0.DateTime={stamp}"));

        if let Some(fix) = fix {
            gps_tags(fix, &mut tags);
        }
        tags.extend(self.user.iter().take(MAX_USER_TAGS).cloned());
        Metadata::Tags(tags)
    }
}

fn gps_tags(fix: &NavigationFix, tags: &mut Vec<String>) {
    tags.push(format!("GPS.GPSLatitude={}", dms(&fix.latitude)));
    tags.push(format!(
        "GPS.GPSLatitudeRef={}",
        fix.latitude.hemisphere.as_ref_tag()
    ));
    tags.push(format!("GPS.GPSLongitude={}", dms(&fix.longitude)));
    tags.push(format!(
        "GPS.GPSLongitudeRef={}",
        fix.longitude.hemisphere.as_ref_tag()
    ));

    let below_sea_level = fix.altitude.value < 0;
    tags.push(format!("GPS.GPSAltitude={}", fix.altitude.abs()));
    tags.push(format!("GPS.GPSAltitudeRef={}", u8::from(below_sea_level)));

    tags.push(format!("GPS.GPSSpeed={}", fix.speed.abs()));
    tags.push("GPS.GPSSpeedRef=N".to_string());
    tags.push(format!("GPS.GPSTrack={}", fix.course.abs()));
    // no compass on board, heading of travel stands in for heading of view
    tags.push(format!("GPS.GPSImgDirection={}", fix.course.abs()));
}

/// EXIF wants degrees, minutes, seconds as three rationals.
fn dms(c: &Coordinate) -> String {
    format!(
        "{}/1,{}/{},0/1000",
        c.degrees, c.minutes_scaled, c.minutes_scale
    )
}
