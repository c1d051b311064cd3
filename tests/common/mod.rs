//! Common test utilities
//!
//! SUUMO-like search-result markup: one `cassetteitem` card per building,
//! one table row per room.

#![allow(dead_code)]

use madori::models::ListingRecord;

/// One room row; `href` carries the listing id
pub fn room_row(href: &str, floor: &str, rent: &str, layout: &str) -> String {
    format!(
        r#"<tr class="js-cassette_link">
            <td></td>
            <td>{floor}</td>
            <td>
              <ul>
                <li><span class="cassetteitem_price cassetteitem_price--rent"><span class="cassetteitem_other-emphasis ui-text--bold">{rent}</span></span></li>
                <li><span class="cassetteitem_price cassetteitem_price--administration">5000円</span></li>
              </ul>
            </td>
            <td>
              <ul>
                <li><span class="cassetteitem_madori">{layout}</span></li>
                <li><span class="cassetteitem_menseki">25.5m<sup>2</sup></span></li>
              </ul>
            </td>
            <td class="ui-text--midium ui-text--bold"><a href="{href}" class="js-cassette_link_href cassetteitem_other-linktext">詳細を見る</a></td>
          </tr>"#
    )
}

/// One building card holding `rows`
pub fn building_card(title: &str, rows: &[String]) -> String {
    format!(
        r#"<div class="cassetteitem">
          <div class="cassetteitem-detail">
            <div class="cassetteitem-detail-object">
              <div class="cassetteitem_content">
                <div class="cassetteitem_content-label"><span class="ui-pct ui-pct--util1">賃貸マンション</span></div>
                <div class="cassetteitem_content-title">{title}</div>
                <div class="cassetteitem_content-body">
                  <ul class="cassetteitem_detail">
                    <li class="cassetteitem_detail-col1">東京都新宿区西新宿１</li>
                    <li class="cassetteitem_detail-col2">
                      <div class="cassetteitem_detail-text">ＪＲ山手線/新宿駅 歩5分</div>
                    </li>
                    <li class="cassetteitem_detail-col3"><div>築10年</div><div>12階建</div></li>
                  </ul>
                </div>
              </div>
            </div>
          </div>
          <div class="cassetteitem-item">
            <table class="cassetteitem_other">
              <thead><tr><th>階</th><th>賃料</th><th>間取り</th><th></th></tr></thead>
              <tbody>{}</tbody>
            </table>
          </div>
        </div>"#,
        rows.concat()
    )
}

/// Full search-results document around `cards`
pub fn search_page(cards: &[String]) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="ja">
<head><meta charset="UTF-8"><title>賃貸物件一覧 | SUUMO</title></head>
<body>
  <div id="js-bukkenList">{}</div>
</body>
</html>"#,
        cards.concat()
    )
}

/// Listing path for a numeric id
pub fn listing_href(n: u32) -> String {
    format!("/chintai/jnc_{n:012}/?bc={n}")
}

/// Listing id as extracted from `listing_href(n)`
pub fn listing_id(n: u32) -> String {
    format!("jnc_{n:012}")
}

/// Page with one card per listing number
pub fn page_with_listings(numbers: &[u32]) -> String {
    let cards: Vec<String> = numbers
        .iter()
        .map(|&n| {
            building_card(
                &format!("メゾン{n}"),
                &[room_row(&listing_href(n), "3階", "8.5万円", "1K")],
            )
        })
        .collect();
    search_page(&cards)
}

/// Five located rooms, the third without a usable id
pub fn page_with_one_missing_id() -> String {
    search_page(&[
        building_card(
            "パークハイツ西新宿",
            &[
                room_row(&listing_href(201), "2階", "9.2万円", "1DK"),
                room_row(&listing_href(202), "5階", "9.8万円", "1LDK"),
            ],
        ),
        building_card(
            "コーポ中野",
            &[
                room_row("/chintai/bukken/detail/", "1階", "6.1万円", "1R"),
                room_row(&listing_href(204), "2階", "6.4万円", "1K"),
            ],
        ),
        building_card(
            "グランメゾン高円寺",
            &[room_row(&listing_href(205), "7階", "12万円", "2LDK")],
        ),
    ])
}

/// Block page served instead of results
pub const BLOCKED_RESPONSE: &str = r#"{"error":"too many requests"}"#;

/// Create a test record with default display values
pub fn create_test_record(n: u32) -> ListingRecord {
    let mut record = ListingRecord::new(
        listing_id(n),
        format!("https://suumo.jp{}", listing_href(n)),
        format!("メゾン{n}"),
        "8.5万円",
        "1K",
    );
    record.area = "25.5m2".to_string();
    record.floor = "3階".to_string();
    record
}
