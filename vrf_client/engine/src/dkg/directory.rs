//! Paginated, deduplicated membership discovery.

use std::collections::HashSet;

use tracing::{debug, instrument};

use crate::error::VrfError;
use crate::ledger::DkgContract;
use crate::types::Member;

pub const DEFAULT_PAGE_SIZE: u8 = 5;

pub struct MemberDirectory {
    contract: DkgContract,
    page_size: u8,
}

impl MemberDirectory {
    pub fn new(contract: DkgContract, page_size: u8) -> Self {
        MemberDirectory {
            contract,
            page_size: page_size.max(1),
        }
    }

    /// Walks the member pages until `total` distinct indexes are seen or the
    /// ledger stops making progress. Returns members sorted by index.
    #[instrument(skip(self), fields(page_size = self.page_size))]
    pub async fn get_members(&self, total: u32) -> Result<Vec<Member>, VrfError> {
        let mut members: Vec<Member> = Vec::with_capacity(total as usize);
        let mut seen: HashSet<u32> = HashSet::new();
        let mut offset: Option<String> = None;

        while members.len() < total as usize {
            let page = self.contract.get_members(offset.clone(), self.page_size).await?;
            let Some(last) = page.last() else {
                break;
            };
            let next_offset = Some(last.address.clone());

            let before = members.len();
            for member in page {
                if seen.insert(member.index) {
                    members.push(member);
                }
            }
            debug!(fetched = members.len(), total, "member page");

            if members.len() == before || next_offset == offset {
                break;
            }
            offset = next_offset;
        }

        if members.len() < total as usize {
            return Err(VrfError::IncompleteMembership {
                found: members.len(),
                total,
            });
        }
        members.sort_by_key(|m| m.index);
        Ok(members)
    }

    /// `None` when the address is unknown or the member was removed.
    pub async fn get_member(&self, address: &str) -> Result<Option<Member>, VrfError> {
        Ok(self.contract.get_member(address).await?.filter(|m| !m.deleted))
    }

    /// Members that already dealt, checked against the ledger's dealer count.
    pub fn get_dealers(members: &[Member], dealer: u32) -> Result<Vec<Member>, VrfError> {
        let dealers: Vec<Member> = members.iter().filter(|m| m.has_dealt()).cloned().collect();
        if dealers.len() != dealer as usize {
            return Err(VrfError::DealerCountMismatch {
                expected: dealer,
                found: dealers.len(),
            });
        }
        Ok(dealers)
    }
}
