/// Running aggregate for every transaction recorded within one whole second.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bucket {
    pub second: i64,
    pub sum: f64,
    pub count: u64,
    pub max: f64,
    pub min: f64,
}

impl Bucket {
    /// Open a bucket seeded with its first transaction.
    pub fn open(second: i64, amount: f64) -> Self {
        Self {
            second,
            sum: amount,
            count: 1,
            max: amount,
            min: amount,
        }
    }

    /// Fold another amount into the bucket.
    ///
    /// Max is tested first; an amount that raises the max is not also tested
    /// against the min. Both start at the first amount, so no amount can be
    /// above the max and below the min at once.
    pub fn absorb(&mut self, amount: f64) {
        self.count += 1;
        self.sum += amount;
        if amount > self.max {
            self.max = amount;
        } else if amount < self.min {
            self.min = amount;
        }
    }
}
