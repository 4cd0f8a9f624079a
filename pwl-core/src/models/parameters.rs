use super::{Set, demand_constraint, square_constraint};

/// A linear demand curve, `quantity = intercept - slope · price`
#[derive(Clone, Copy, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct DemandCurve {
    /// The quantity demanded at a price of zero
    pub intercept: f64,
    /// The drop in quantity per unit increase of price
    pub slope: f64,
}

impl DemandCurve {
    /// The price at which demand reaches zero, `intercept / slope`
    pub fn max_price(&self) -> f64 {
        self.intercept / self.slope
    }

    /// The quantity demanded at `price`
    pub fn quantity(&self, price: f64) -> f64 {
        self.intercept - self.slope * price
    }

    /// The price at which `quantity` is demanded
    pub fn price(&self, quantity: f64) -> f64 {
        (self.intercept - quantity) / self.slope
    }
}

/// A product whose price the monopolist sets
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Product {
    /// A unique name, used to derive variable and constraint names
    pub name: String,
    /// The demand curve for this product
    pub demand: DemandCurve,
}

/// A capacity-limited resource consumed by production
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Resource {
    /// A unique name, used as the capacity constraint's name
    pub name: String,
    /// The available capacity
    pub limit: f64,
    /// The cost of one unit of the resource
    pub unit_cost: f64,
    /// Units of the resource consumed per unit of each product, in product order
    pub usage: Vec<f64>,
}

/// The immutable constants of a pricing problem
///
/// The parameters are validated on construction (and deserialization), so any
/// instance can be turned into a model without further checks:
/// - at least one product,
/// - finite, positive demand intercepts and slopes,
/// - finite, non-negative resource limits, costs and usage coefficients,
/// - one usage coefficient per product for every resource,
/// - unique product and resource names,
/// - no resource named like a generated constraint (`demand_<product>` or
///   `square_<product>`).
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(try_from = "ProblemParametersDto", into = "ProblemParametersDto")
)]
pub struct ProblemParameters {
    products: Vec<Product>,
    resources: Vec<Resource>,
}

impl ProblemParameters {
    /// Creates a new parameter set, validating all constraints
    pub fn new(products: Vec<Product>, resources: Vec<Resource>) -> Result<Self, ParameterError> {
        Self::try_from(ProblemParametersDto {
            products,
            resources,
        })
    }

    /// The two-product instance the approximation technique is usually demonstrated on
    ///
    /// - product 1: `q1 = 10000 - 8 p1`
    /// - product 2: `q2 = 16000 - 10 p2`
    /// - machine hours: `0.1 q1 + 0.2 q2 ≤ 600` at 2000 per hour
    /// - raw material: `0.5 q1 + 0.3 q2 ≤ 3000` at 500 per unit
    pub fn reference() -> Self {
        Self {
            products: vec![
                Product {
                    name: "1".into(),
                    demand: DemandCurve {
                        intercept: 10000.0,
                        slope: 8.0,
                    },
                },
                Product {
                    name: "2".into(),
                    demand: DemandCurve {
                        intercept: 16000.0,
                        slope: 10.0,
                    },
                },
            ],
            resources: vec![
                Resource {
                    name: "machine_hours".into(),
                    limit: 600.0,
                    unit_cost: 2000.0,
                    usage: vec![0.1, 0.2],
                },
                Resource {
                    name: "raw_material".into(),
                    limit: 3000.0,
                    unit_cost: 500.0,
                    usage: vec![0.5, 0.3],
                },
            ],
        }
    }

    /// The products, in order
    pub fn products(&self) -> &[Product] {
        &self.products
    }

    /// The resources, in order
    pub fn resources(&self) -> &[Resource] {
        &self.resources
    }

    /// The production cost of one unit of the product at `index`,
    /// summed over every resource it consumes
    pub fn unit_cost(&self, index: usize) -> f64 {
        self.resources
            .iter()
            .map(|resource| resource.unit_cost * resource.usage[index])
            .sum()
    }
}

/// DTO to ensure that we always validate when we deserialize from an untrusted source
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[derive(Debug)]
pub struct ProblemParametersDto {
    /// The products
    pub products: Vec<Product>,
    /// The resources
    pub resources: Vec<Resource>,
}

impl From<ProblemParameters> for ProblemParametersDto {
    fn from(value: ProblemParameters) -> Self {
        Self {
            products: value.products,
            resources: value.resources,
        }
    }
}

impl TryFrom<ProblemParametersDto> for ProblemParameters {
    type Error = ParameterError;

    fn try_from(value: ProblemParametersDto) -> Result<Self, Self::Error> {
        if value.products.is_empty() {
            return Err(ParameterError::NoProducts);
        }

        let mut names = Set::<&str>::default();

        for product in value.products.iter() {
            if !names.insert(&product.name) {
                return Err(ParameterError::DuplicateName(product.name.clone()));
            }
            let DemandCurve { intercept, slope } = product.demand;
            if !(intercept.is_finite() && intercept > 0.0 && slope.is_finite() && slope > 0.0) {
                return Err(ParameterError::InvalidDemand(product.name.clone()));
            }
        }

        for resource in value.resources.iter() {
            if !names.insert(&resource.name) {
                return Err(ParameterError::DuplicateName(resource.name.clone()));
            }
            let reserved = value.products.iter().any(|product| {
                resource.name == demand_constraint(&product.name)
                    || resource.name == square_constraint(&product.name)
            });
            if reserved {
                return Err(ParameterError::ReservedName(resource.name.clone()));
            }
            if resource.usage.len() != value.products.len() {
                return Err(ParameterError::UsageMismatch {
                    resource: resource.name.clone(),
                    expected: value.products.len(),
                    found: resource.usage.len(),
                });
            }
            let valid = std::iter::once(resource.limit)
                .chain(std::iter::once(resource.unit_cost))
                .chain(resource.usage.iter().copied())
                .all(|x| x.is_finite() && x >= 0.0);
            if !valid {
                return Err(ParameterError::InvalidResource(resource.name.clone()));
            }
        }

        Ok(Self {
            products: value.products,
            resources: value.resources,
        })
    }
}

/// Errors that can occur when creating or validating ProblemParameters
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ParameterError {
    /// No products were given
    #[error("at least one product is required")]
    NoProducts,
    /// A product and/or resource name is used twice
    #[error("name {0} is used more than once")]
    DuplicateName(String),
    /// A resource is named like a constraint generated for a product
    #[error("resource name {0} is reserved for a generated constraint")]
    ReservedName(String),
    /// A demand curve has a non-positive or non-finite intercept or slope
    #[error("demand curve of product {0} needs a positive, finite intercept and slope")]
    InvalidDemand(String),
    /// A resource has the wrong number of usage coefficients
    #[error("resource {resource} has {found} usage coefficients, expected {expected}")]
    UsageMismatch {
        /// The offending resource
        resource: String,
        /// The number of products
        expected: usize,
        /// The number of coefficients given
        found: usize,
    },
    /// A resource has a negative or non-finite limit, cost or coefficient
    #[error("resource {0} has a negative or non-finite value")]
    InvalidResource(String),
}
